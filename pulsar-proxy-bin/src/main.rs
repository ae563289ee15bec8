#![deny(unsafe_code)]

use std::process;
use std::time::Duration;

use structopt::StructOpt;

use pulsar_proxy::conf::{Options, Settings};
use pulsar_proxy::context::ServerContext;
use pulsar_proxy::logger::{config_logger, logger_init};
use pulsar_proxy::server::ProxyServer;

#[tokio::main]
async fn main() {
    //init config
    let settings = Settings::new(Options::from_args()).expect("settings init failed");

    //init log
    let logger = config_logger(&settings.log).expect("logger config failed");
    logger_init(logger, settings.log.level).expect("logger init failed");

    settings.logs();

    let max_frame_size = settings.max_frame_size();
    let mut listeners = Vec::new();
    for listen_cfg in settings.listeners.iter() {
        match listen_cfg.builder(max_frame_size).bind() {
            Ok(l) => listeners.push(l),
            Err(e) => {
                log::error!("listen on {} {} failed: {e}", listen_cfg.name, listen_cfg.addr);
                process::exit(1);
            }
        }
    }

    let scx = ServerContext::new(settings).build();
    let mut server = ProxyServer::new(scx.clone());
    for l in listeners {
        server = server.listener(l);
    }

    let server = server.build();
    tokio::select! {
        res = server.run() => {
            if let Err(e) = res {
                log::error!("pulsar proxy stopped: {e}");
                process::exit(1);
            }
        }
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                log::error!("waiting for ctrl-c failed: {e}");
            }
            log::info!("shutting down");
        }
    }

    scx.shutdown().await;
    tokio::time::sleep(Duration::from_secs(1)).await;
}
