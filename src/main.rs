/// IPAM admin - user approval, IP inventory and audit trail service
use ipam_admin::{server, AppContext, IpamResult, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> IpamResult<()> {
    // Load configuration
    let config = ServerConfig::from_env()?;

    // Initialize logging
    let filter = EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| "ipam_admin=info,tower_http=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    print_banner();

    // Create application context
    let ctx = AppContext::new(config).await?;

    // Start server
    server::serve(ctx).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
    ________  ___    __  ___
   /  _/ __ \/   |  /  |/  /
   / // /_/ / /| | / /|_/ /
 _/ // ____/ ___ |/ /  / /
/___/_/   /_/  |_/_/  /_/

        IPAM admin v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
