use std::net::SocketAddr;

use structopt::StructOpt;

#[derive(StructOpt, Debug, Clone, Default)]
#[structopt(name = "pulsar-proxy", about = "Pulsar protocol proxy")]
pub struct Options {
    /// Config filename
    #[structopt(name = "config", short = "f", long)]
    pub cfg_name: Option<String>,

    /// Listen address of the default tcp listener, e.g. 0.0.0.0:6650
    #[structopt(name = "laddr", long)]
    pub laddr: Option<SocketAddr>,
}
