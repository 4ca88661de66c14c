//! Runs the server with host FUSE mounts enabled.
//!
//! ```text
//! cargo run --example serve9 -- --listen /ip4/127.0.0.1/tcp/5640
//! ```
//!
//! Then drive it with any 9P2000.L client, e.g. a kernel mount:
//!
//! ```text
//! mount -t 9p -o trans=tcp,port=5640,version=9p2000.L 127.0.0.1 /mnt/ctl
//! mkdir -p /mnt/ctl/mounts/fuse/ipfs
//! echo '{"ApiMaddr":"/ip4/127.0.0.1/tcp/5001","Target":"/mnt/ipfs"}' \
//!     > /mnt/ctl/mounts/fuse/ipfs/live
//! ```

#[cfg(unix)]
mod run {
    use std::path::PathBuf;

    use clap::Parser;
    use tracing::info;
    use tracing_subscriber::EnvFilter;

    use mount9::maddr::Multiaddr;
    use mount9::{host_server, Result, Settings};

    #[derive(Debug, Parser)]
    #[command(name = "serve9", about = "9P mount-control file server")]
    struct Args {
        /// TOML settings file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Listener multiaddrs; overrides the settings file.
        #[arg(long)]
        listen: Vec<String>,

        /// Identity stamped on created nodes and host mounts.
        #[arg(long)]
        uid: Option<u32>,
        #[arg(long)]
        gid: Option<u32>,
    }

    pub async fn main() -> Result<()> {
        tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

        let args = Args::parse();
        let mut settings = match &args.config {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };
        if !args.listen.is_empty() {
            settings.listen = args.listen.clone();
        }
        if let Some(uid) = args.uid {
            settings.uid = uid;
        }
        if let Some(gid) = args.gid {
            settings.gid = gid;
        }

        let server = host_server(&settings);
        for address in &settings.listen {
            let maddr: Multiaddr = address.parse()?;
            let bound = server.listen(&maddr).await?;
            info!(%bound, "serving 9P");
        }

        tokio::select! {
            result = server.serve() => result,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                server.shutdown();
                server.serve().await
            }
        }
    }
}

#[cfg(unix)]
#[tokio::main]
async fn main() {
    if let Err(err) = run::main().await {
        eprintln!("serve9: {err}");
        std::process::exit(1);
    }
}

#[cfg(not(unix))]
fn main() {
    eprintln!("serve9 requires a unix platform");
    std::process::exit(1);
}
