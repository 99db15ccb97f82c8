use bookshelf::config::{ClientConfig, LogConfig, ServerConfig};

const USAGE: &str = "usage: bookshelf [mcp] | bookshelf serve [ADDR]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    LogConfig::from_env().init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("mcp") => {
            let config = ClientConfig::from_env()?;
            bookshelf::interface::mcp::run(config).await
        }
        Some("serve") => {
            let mut config = ServerConfig::from_env()?;
            if let Some(addr) = args.get(1) {
                config = config.with_bind(addr)?;
            }
            bookshelf::interface::rest::run(config).await
        }
        Some(other) => anyhow::bail!("unknown command '{other}'\n{USAGE}"),
    }
}
