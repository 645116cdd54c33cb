use std::sync::Arc;
use cluster::{FileNaming, Naming, ReplicaConfig, StaticNaming};
use log::info;
use logger::logger;
use server::Server;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() {
    logger::setup_logging();

    let ascii_logo = r#"
 _             _               _
| | ___   ___ | | _____  _   _| |_
| |/ _ \ / _ \| |/ / _ \| | | | __|
| | (_) | (_) |   < (_) | |_| | |_
|_|\___/ \___/|_|\_\___/ \__,_|\__|
-----------------------------------------------
Replicated camera sighting store
-----------------------------------------------
    "#;

    println!("{}", ascii_logo);

    let config = match ReplicaConfig::from_env() {
        Some(c) => c,
        None => {
            eprintln!("LOOKOUT_REPLICA_ID must be set to an id below LOOKOUT_REPLICAS");
            std::process::exit(1);
        }
    };

    let naming: Arc<dyn Naming> = match &config.naming_file {
        Some(path) => Arc::new(FileNaming::new(path.clone())),
        None => {
            info!("No LOOKOUT_NAMING_FILE set, using in-process registry");
            Arc::new(StaticNaming::new())
        }
    };

    let server = match Server::new(config, naming) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to initialize replica: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run().await {
        eprintln!("Replica error: {}", e);
        std::process::exit(1);
    }
}
