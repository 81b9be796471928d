fn main() {
    // Build scripts run on the host; only emit ESP-IDF link args for xtensa targets
    if let Ok(target) = std::env::var("TARGET") {
        if target.contains("xtensa") {
            embuild::espidf::sysenv::output();
        }
    }
}
