use std::ffi::OsString;
use std::path::Path;

use insights_host_runner::{
    toolchain_for, CompileRequest, PlatformFamily, Toolchain, TransformRequest, UnixToolchain,
    WindowsToolchain,
};

fn strs(v: &[OsString]) -> Vec<String> {
    v.iter().map(|a| a.to_string_lossy().into_owned()).collect()
}

#[test]
fn transform_argv_unix() {
    let extra = vec!["-edu-show-cfront".to_string()];
    let req = TransformRequest {
        source: Path::new("EduCfrontTest.cpp"),
        standard: "-std=c++20",
        extra_options: &extra,
        use_libcxx: true,
    };
    assert_eq!(
        strs(&UnixToolchain.transform_args(&req)),
        vec![
            "EduCfrontTest.cpp",
            "-use-libc++",
            "-edu-show-cfront",
            "--",
            "-std=c++20",
            "-m64",
        ]
    );
}

#[test]
fn transform_argv_without_options() {
    let req = TransformRequest {
        source: Path::new("Issue277.cpp"),
        standard: "-std=c++17",
        extra_options: &[],
        use_libcxx: false,
    };
    for family in [PlatformFamily::Unix, PlatformFamily::Windows] {
        assert_eq!(
            strs(&toolchain_for(family).transform_args(&req)),
            vec!["Issue277.cpp", "--", "-std=c++17", "-m64"],
            "family={family}"
        );
    }
}

#[test]
fn compile_argv_unix() {
    let extra = vec!["-Wno-everything".to_string()];
    let req = CompileRequest {
        source: Path::new("/tmp/w/Issue277.cpp"),
        standard: "-std=c++17",
        extra_args: &extra,
    };
    assert_eq!(
        strs(&UnixToolchain.compile_args(&req)),
        vec![
            "-std=c++17",
            "-D__cxa_guard_acquire(x)=true",
            "-D__cxa_guard_release(x)",
            "-D__cxa_guard_abort(x)",
            "-m64",
            "-Wno-everything",
            "-c",
            "/tmp/w/Issue277.cpp",
        ]
    );
}

#[test]
fn compile_argv_windows() {
    let req = CompileRequest {
        source: Path::new("C:\\t\\Issue277.cpp"),
        standard: "-std=c++2a",
        extra_args: &[],
    };
    assert_eq!(
        strs(&WindowsToolchain.compile_args(&req)),
        vec![
            "/std:c++latest",
            "/nologo",
            "/EHsc",
            "/IGNORE:C4335",
            "-c",
            "C:\\t\\Issue277.cpp",
        ]
    );
}

#[test]
fn selected_toolchain_reports_its_family() {
    assert_eq!(
        toolchain_for(PlatformFamily::Windows).family(),
        PlatformFamily::Windows
    );
    assert_eq!(
        toolchain_for(PlatformFamily::Unix).family(),
        PlatformFamily::Unix
    );
}
