#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = examflow::run().await {
        eprintln!("examflow fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
