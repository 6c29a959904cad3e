#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = enrollment_ledger::run().await {
        eprintln!("enrollment-ledger fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
