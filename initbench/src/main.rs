fn main() {
    let code = match initbench::run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            initbench::EXIT_FAULT
        }
    };
    std::process::exit(code);
}
