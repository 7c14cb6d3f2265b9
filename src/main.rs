use minihttp::config::Config;
use minihttp::http::{Body, Message};
use minihttp::server::Server;

/// Data handed to every handler call.
struct Site {
    name: &'static str,
}

static GREETING: &[u8] = b"Hello from minihttp\n";

fn hello(request: &Message, site: &Site) -> Option<Message> {
    tracing::info!(
        client = %request.client_info(),
        method = request.method.as_deref().unwrap_or("-"),
        target = request.target.as_deref().unwrap_or("-"),
        "{}",
        site.name
    );

    let mut response = Message::response(200, Some("text/plain"), Body::from_static(GREETING));
    response.set("Server", site.name);
    Some(response)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;
    let mut server = Server::bind(&cfg.server)?;

    let event_loop = tokio::task::spawn_blocking(move || {
        let site = Site { name: "minihttp/0.1" };
        server.listen(hello, &site)
    });

    tokio::select! {
        res = event_loop => {
            res??;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            // the event loop blocks in poll(2) and has no shutdown path
            std::process::exit(0);
        }
    }

    Ok(())
}
