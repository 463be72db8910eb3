use zone_server::frameworks::server;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Delegate to the server framework entry point.
    server::run_with_config().await
}
