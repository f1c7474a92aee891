mod host;
mod store;
mod transcribe;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
