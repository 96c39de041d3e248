fn main() {
    // The ESP-IDF environment is only needed for firmware builds (Xtensa target
    // with the esp32 feature); host builds and tests skip it.
    let xtensa = std::env::var("TARGET").is_ok_and(|target| target.contains("xtensa"));
    let esp32 = std::env::var_os("CARGO_FEATURE_ESP32").is_some();
    if xtensa && esp32 {
        embuild::espidf::sysenv::output();
    }
}
