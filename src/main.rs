#[tokio::main]
async fn main() {
    if let Err(e) = clinic_records::run().await {
        eprintln!("clinic-records: {e}");
        std::process::exit(1);
    }
}
