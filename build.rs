fn main() {
    // Inform cargo to rerun if linker script changes
    println!("cargo:rerun-if-changed=linker.ld");

    // Only the bare-metal kernel image is linked with the Limine layout;
    // host builds (unit tests) use the platform default.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("none") {
        let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();
        println!("cargo:rustc-link-arg-bins=-T{manifest_dir}/linker.ld");
    }
}
