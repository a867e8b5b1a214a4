fn main() {
    if let Err(error) = study_tracker::run() {
        eprintln!("study-tracker: {error}");
        std::process::exit(1);
    }
}
