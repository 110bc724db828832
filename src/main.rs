use visit_counter::{config::VisitsConfig, prelude::*, visits};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app = App::new();
    let config = VisitsConfig::from_env()?;
    info!(
        increment = %config.increment,
        init = %config.init,
        "Starting visit counter"
    );

    let store = RedisStore::open(&config.redis_url)?;
    if let Err(e) = store.connect().await {
        error!("Redis Connection Error: {e}");
    }

    let counter = CounterService::new(store).with_strategy(config.increment);
    let app = visits::mount(app, counter, config.init, config.view).await;
    app.start().await
}
