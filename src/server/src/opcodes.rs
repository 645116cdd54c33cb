// Operation codes for the wire protocol

// Control operations
pub const OP_PING: u16 = 1;
pub const OP_RESET: u16 = 2;
pub const OP_SEED: u16 = 3;

// Write operations
pub const OP_REGISTER_CAMERA: u16 = 10;
pub const OP_CAMERA_INFO: u16 = 11;
pub const OP_REPORT: u16 = 12;

// Query operations
pub const OP_TRACK_EXACT: u16 = 20;
pub const OP_TRACE_ALL: u16 = 21;
pub const OP_TRACK_PATTERN: u16 = 22;

// Replica to replica
pub const OP_GOSSIP_PULL: u16 = 30;

// Error response (status byte carries the code)
pub const OP_ERROR: u16 = 255;
