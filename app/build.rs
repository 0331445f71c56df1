fn main() {
    // Settings are baked in at compile time from cfg.toml.
    println!("cargo:rerun-if-changed=cfg.toml");
    println!("cargo:rerun-if-changed=build.rs");
}
