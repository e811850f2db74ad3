fn main() {
    if let Err(e) = serialsim_lib::run() {
        eprintln!("serialsim: {}", e);
        std::process::exit(1);
    }
}
