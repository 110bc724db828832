use visit_counter::{prelude::*, visits};

/// App wired like the binary, over an in memory store the test can inspect
/// and disconnect.
pub async fn app(view: VisitsView, strategy: IncrementStrategy) -> (App, MemoryStore) {
    let store = MemoryStore::new();
    let counter = CounterService::new(store.clone()).with_strategy(strategy);
    let app = visits::mount(App::new(), counter, InitPolicy::Reset, view).await;
    (app, store)
}

pub async fn text_app() -> (App, MemoryStore) {
    app(VisitsView::default(), IncrementStrategy::ReadWrite).await
}
