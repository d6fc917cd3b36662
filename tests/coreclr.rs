//! End-to-end tests against a real .NET runtime.
//!
//! Build the managed test library first and point the tests at it:
//!
//! ```text
//! dotnet build tests/managed -c Release -o target/managed
//! CLRLOADER_TEST_LIB=target/managed/Lib.dll cargo test --test coreclr
//! ```
//!
//! Without `CLRLOADER_TEST_LIB` every test returns early. `hostfxr` allows one runtime per
//! process, so all scenarios share a single runtime and run from one test function.

use std::path::{Path, PathBuf};

use clrloader::{get_coreclr, BackendKind, CoreClrConfig, Error, Runtime};

fn test_library() -> Option<(PathBuf, PathBuf)> {
    let library = PathBuf::from(std::env::var_os("CLRLOADER_TEST_LIB")?);
    let runtime_config = library.with_file_name("Lib.runtimeconfig.json");
    Some((library, runtime_config))
}

fn echo_round_trip(runtime: &Runtime, library: &Path) {
    let echo = runtime
        .get_assembly(library)
        .get_function("Lib.Echo", None)
        .unwrap();

    let mut buffer = *b"hello";
    assert_eq!(echo.invoke(&mut buffer), 5);
    assert_eq!(&buffer, b"hello");

    let mut empty: [u8; 0] = [];
    assert_eq!(echo.invoke(&mut empty), 0);
}

fn independent_functions(runtime: &Runtime, library: &Path) {
    let assembly = runtime.get_assembly(library);
    let first = assembly.get_function("Lib", Some("Echo")).unwrap();
    let second = assembly.get_function("Lib.Echo", None).unwrap();
    let reverse = assembly.get_function("Lib.Reverse", None).unwrap();
    let nested = assembly.get_function("Lib+Nested.Length", None).unwrap();

    assert_ne!(first.address(), reverse.address());

    let mut buffer = *b"abc";
    assert_eq!(first.invoke(&mut buffer), 3);
    assert_eq!(second.invoke(&mut buffer), 3);
    assert_eq!(&buffer, b"abc");
    assert_eq!(reverse.invoke(&mut buffer), -3);
    assert_eq!(&buffer, b"cba");
    assert_eq!(nested.invoke(&mut [0u8; 9]), 9);
}

fn resolution_failures(runtime: &Runtime, library: &Path) {
    let assembly = runtime.get_assembly(library);

    match assembly.get_function("Lib.DoesNotExist.Echo", None) {
        Err(Error::MemberResolution {
            backend,
            type_name,
            method_name,
            ..
        }) => {
            assert_eq!(backend, BackendKind::CoreClr);
            assert_eq!(type_name, "Lib.DoesNotExist");
            assert_eq!(method_name, "Echo");
        }
        other => panic!("unexpected result: {other:?}"),
    }

    assert!(matches!(
        assembly.get_function("Lib.Missing", None),
        Err(Error::MemberResolution { .. })
    ));
    assert!(matches!(
        assembly.get_function("Lib.WrongSignature", None),
        Err(Error::MemberResolution { .. })
    ));

    let missing = library.with_file_name("Missing.dll");
    assert!(matches!(
        runtime.get_assembly(&missing).get_function("Lib.Echo", None),
        Err(Error::AssemblyLoad { .. })
    ));
}

#[test]
fn coreclr_end_to_end() {
    let Some((library, runtime_config)) = test_library() else {
        eprintln!("CLRLOADER_TEST_LIB not set, skipping");
        return;
    };

    let runtime = get_coreclr(
        CoreClrConfig::new(&runtime_config).property("CLRLOADER_TEST", "1"),
    )
    .unwrap();
    assert_eq!(runtime.kind(), BackendKind::CoreClr);

    let before = runtime.info();
    assert!(!before.initialized);
    assert_eq!(
        before.properties.get("CLRLOADER_TEST").map(String::as_str),
        Some("1")
    );

    echo_round_trip(&runtime, &library);
    independent_functions(&runtime, &library);
    resolution_failures(&runtime, &library);

    assert!(runtime.info().initialized);
}
