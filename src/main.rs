fn main() {
    if let Err(err) = fuel_loads::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
