use std::thread;
use std::time::Duration;

use loophttp::config::Config;
use loophttp::tweak::{TweakRegistry, TweakServer};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;

    let registry = TweakRegistry::new();
    let value = registry.tweak("value", 1.0f32);
    let range_value = registry.tweak_with_hint("range_value", "float 0.0 1.0", 0.5f32);
    let other_value = registry.tweak_with_hint("other_value", "", 0.5f32);

    let server = TweakServer::spawn(registry.clone(), &cfg.tweak)?;
    tracing::info!("open http://{} to tweak values", server.local_addr());

    loop {
        thread::sleep(Duration::from_millis(100));

        let before = [value.get(), range_value.get(), other_value.get()];
        registry.sync();

        for (tweak, old) in [&value, &range_value, &other_value].into_iter().zip(before) {
            let new = tweak.get();
            if new != old {
                tracing::info!(name = tweak.name(), value = new, "tweaked");
            }
        }
    }
}
