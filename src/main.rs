mod analyzer;
mod app;
mod classifier;
mod escalation;
mod lexicon;
mod orders;
mod pipeline;
mod prompting;
mod tickets;
mod types;

#[tokio::main]
async fn main() {
    app::run().await;
}
