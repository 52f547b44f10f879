/// oskit build script.
///
/// Selects exactly one platform backend for the target and exposes it to the
/// crate as `cfg(oskit_backend = "...")`.  There is no runtime switching: the
/// `platform` module compiles only the selected backend.
fn main() {
    println!("cargo:rustc-check-cfg=cfg(oskit_backend, values(\"win32\", \"posix\", \"fallback\"))");
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=OSKIT_FORCE_FALLBACK");

    let backend = select_backend(
        &std::env::var("CARGO_CFG_TARGET_FAMILY").unwrap_or_default(),
        std::env::var_os("OSKIT_FORCE_FALLBACK").is_some_and(|v| !v.is_empty() && v != "0"),
    );

    println!("cargo:rustc-cfg=oskit_backend=\"{backend}\"");
}

/// Map the target family (a comma-separated list, e.g. `"unix"` or
/// `"unix,wasm"`) to a backend name.
///
/// Unknown families get the fallback backend, which still builds and links
/// but fails every call with `UNSUPPORTED_OPERATION`.
fn select_backend(families: &str, force_fallback: bool) -> &'static str {
    if force_fallback {
        return "fallback";
    }
    let mut families = families.split(',').map(str::trim);
    if families.clone().any(|f| f == "windows") {
        "win32"
    } else if families.any(|f| f == "unix") {
        "posix"
    } else {
        "fallback"
    }
}
