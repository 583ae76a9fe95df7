#[tokio::main]
async fn main() -> anyhow::Result<()> {
    palabra_backend::run().await
}
