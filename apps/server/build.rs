use std::env::vars;

use dotenvy::dotenv;

fn main() {
    dotenv().ok();
    println!("cargo:rerun-if-changed=.env");

    // Only our own settings are baked in as compile-time defaults.
    for (k, v) in vars().filter(|(k, _)| k.starts_with("VIGIL_")) {
        println!("cargo:rustc-env={k}={v}");
    }
}
