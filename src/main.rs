#[tokio::main]
async fn main() -> anyhow::Result<()> {
    aegis_doctor_lib::run().await
}
