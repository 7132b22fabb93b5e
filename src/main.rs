fn main() {
    if let Err(e) = sidiya_lib::run() {
        eprintln!("sidiya: {e}");
        std::process::exit(1);
    }
}
