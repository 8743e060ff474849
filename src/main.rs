use loophttp::config::Config;
use loophttp::{Method, Server, StatusCode};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;
    let mut server = Server::from_config(&cfg.server)?;
    let tick = cfg.server.poll_timeout();

    loop {
        server.poll(
            |request, mut response| {
                tracing::info!(method = %request.method, url = %request.url, "request");
                if request.method == Method::GET && request.url == "/" {
                    response.add_header("Content-Type", "text/html");
                    response.set_body("<html><body>Hello World.</body></html>");
                } else {
                    response.set_status(StatusCode::NotFound);
                    response.set_body("<html><body>Not Found</body></html>");
                }
            },
            tick,
        )?;
    }
}
