use std::path::PathBuf;

use clap::Parser;

use earthlyls_client::{HostContext, activate, config, deactivate, log};

/// Launch earthlyls for a workspace and keep it running until Ctrl-C.
#[derive(Parser, Debug)]
#[command(name = "earthlyls-client", version, about)]
struct Args {
    /// Directory containing the `server/` subdirectory with the earthlyls
    /// binaries
    #[arg(long, default_value_os_t = config::default_install_dir())]
    install_dir: PathBuf,

    /// Workspace root to open
    #[arg(long, default_value = ".")]
    workspace: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    log::init()?;

    let ctx = HostContext {
        install_dir: args.install_dir,
        workspace_root: args.workspace.canonicalize()?,
    };

    let mut session = activate(&ctx)?;
    tokio::signal::ctrl_c().await?;
    deactivate(Some(&mut session)).await?;
    Ok(())
}
