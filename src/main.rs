fn main() {
    if let Err(err) = aqualink_pool_api::app::run() {
        eprintln!("application startup failed: {err}");
        std::process::exit(1);
    }
}
