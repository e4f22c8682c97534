fn main() {
    if let Err(e) = phasebench::cmdline() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
