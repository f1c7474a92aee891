mod assoc;
mod buttons;
mod dimmer;
mod engine;
mod host;
mod notify;
mod session;
mod sync;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
