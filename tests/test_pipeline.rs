// tests/test_pipeline.rs — End-to-end runs through the public API.
//
// Tests that need no device run everywhere. GPU tests are `#[ignore]`d and
// use the same subprocess isolation as the unit tests in src/gpu/: the
// inner test prints GPU_TEST_OK, the outer wrapper spawns it with
//   cargo test --test test_pipeline -- <name> --exact --ignored --nocapture
// Run all of them with `cargo test -- --include-ignored`.

use gauss_gpu::config::PipelineConfig;
use gauss_gpu::convert::widen;
use gauss_gpu::convolution::{convolve_2d, max_abs_diff};
use gauss_gpu::error::FilterError;
use gauss_gpu::gpu::device::{acquire_device, DeviceKind, DeviceRequest, ExecutionContext};
use gauss_gpu::gpu::program::{ProgramSource, ENTRY_POINT};
use gauss_gpu::image::{FloatPlane, RasterImage};
use gauss_gpu::kernel::GAUSSIAN_3X3;
use gauss_gpu::pipeline::GaussianPipeline;

fn checkerboard(width: usize, height: usize) -> RasterImage {
    RasterImage::from_fn(width, height, |x, y| if (x + y) % 2 == 0 { 255 } else { 0 })
}

fn run_gpu_test_in_subprocess(test_name: &str) -> String {
    let output = std::process::Command::new("cargo")
        .args([
            "test", "--test", "test_pipeline", "--",
            test_name, "--exact", "--ignored", "--nocapture",
        ])
        .output()
        .unwrap_or_else(|e| panic!("failed to spawn subprocess for {test_name}: {e}"));
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    print!("{stdout}");
    eprint!("{stderr}");
    stdout + &stderr
}

// ===== No device needed =====

#[test]
fn absent_platforms_report_device_unavailable() {
    let before = ExecutionContext::live_count();
    let request = DeviceRequest::new(DeviceKind::DiscreteGpu).with_backends(wgpu::Backends::empty());
    match acquire_device(&request) {
        Err(FilterError::DeviceUnavailable { requested, .. }) => {
            assert_eq!(requested, DeviceKind::DiscreteGpu)
        }
        other => panic!("expected DeviceUnavailable, got {other:?}"),
    }
    assert_eq!(ExecutionContext::live_count(), before, "no context may be left alive");
}

#[test]
fn broken_kernel_source_yields_build_log() {
    let source = "@compute @workgroup_size(16, 16, 1)\nfn gaussian_filter_kernel() {\n    let x: f32 = ;\n}\n";
    match ProgramSource::parse("broken.wgsl", source) {
        Err(FilterError::KernelCompilationError { log }) => {
            assert!(!log.trim().is_empty(), "build log must not be empty");
        }
        other => panic!("expected KernelCompilationError, got {other:?}"),
    }
}

#[test]
fn pipeline_without_platforms_fails_without_output() {
    let pipeline =
        GaussianPipeline::new(PipelineConfig::default().with_backends(wgpu::Backends::empty()));
    let err = pipeline.run(&checkerboard(16, 16), &GAUSSIAN_3X3).unwrap_err();
    assert!(err.is_device_error(), "{err}");
}

// ===== GPU: inner tests =====

#[test]
#[ignore = "GPU integration: run via outer subprocess wrapper"]
fn inner_checkerboard_golden() {
    let pipeline = GaussianPipeline::default();
    let (plane, report) = pipeline
        .run_plane(&widen(&checkerboard(16, 16)), &GAUSSIAN_3X3)
        .expect("GPU run failed");
    println!("{report}");
    for y in 1..15 {
        for x in 1..15 {
            assert!((plane.get(x, y) - 127.5).abs() < 1e-4, "({x}, {y}) = {}", plane.get(x, y));
        }
    }

    let raster = pipeline.run(&checkerboard(16, 16), &GAUSSIAN_3X3).unwrap();
    for y in 1..15 {
        for x in 1..15 {
            assert_eq!(raster.get(x, y), 127, "at ({x}, {y})");
        }
    }
    println!("GPU_TEST_OK");
}

#[test]
#[ignore = "GPU integration: run via outer subprocess wrapper"]
fn inner_dimensions_are_preserved() {
    let pipeline = GaussianPipeline::default();
    for &(w, h) in &[(16, 16), (64, 32), (640, 480), (17, 9), (1, 1)] {
        let out = pipeline.run(&RasterImage::new(w, h), &GAUSSIAN_3X3).unwrap();
        assert_eq!(out.dimensions(), (w, h));
    }
    println!("GPU_TEST_OK");
}

#[test]
#[ignore = "GPU integration: run via outer subprocess wrapper"]
fn inner_constant_image_is_fixed_point() {
    let pipeline = GaussianPipeline::default();
    for &v in &[0u8, 93, 255] {
        let src = RasterImage::filled(48, 20, v);
        assert_eq!(pipeline.run(&src, &GAUSSIAN_3X3).unwrap(), src, "value {v}");
    }
    println!("GPU_TEST_OK");
}

#[test]
#[ignore = "GPU integration: run via outer subprocess wrapper"]
fn inner_gpu_matches_cpu_reference_on_ragged_image() {
    let plane = FloatPlane::from_fn(101, 67, |x, y| ((x * x + 3 * y) % 256) as f32);
    let (gpu, report) = GaussianPipeline::default().run_plane(&plane, &GAUSSIAN_3X3).unwrap();
    assert!(!report.partition.is_exact());
    let cpu = convolve_2d(&plane, &GAUSSIAN_3X3);
    let err = max_abs_diff(&gpu, &cpu);
    assert!(err < 1e-3, "max error {err}");
    println!("GPU_TEST_OK");
}

#[test]
#[ignore = "GPU integration: run via outer subprocess wrapper"]
fn inner_broken_kernel_never_dispatches() {
    let before = ExecutionContext::live_count();
    let pipeline = GaussianPipeline::new(
        PipelineConfig::default().with_kernel_source("fn gaussian_filter_kernel( {", ENTRY_POINT),
    );
    let err = pipeline.run(&checkerboard(16, 16), &GAUSSIAN_3X3).unwrap_err();
    match err {
        FilterError::KernelCompilationError { log } => assert!(!log.is_empty()),
        other => panic!("expected KernelCompilationError, got {other}"),
    }
    assert_eq!(ExecutionContext::live_count(), before);
    println!("GPU_TEST_OK");
}

// ===== GPU: outer wrappers =====

#[test]
#[ignore = "requires a real GPU"]
fn checkerboard_golden() {
    let out = run_gpu_test_in_subprocess("inner_checkerboard_golden");
    assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
}

#[test]
#[ignore = "requires a real GPU"]
fn dimensions_are_preserved() {
    let out = run_gpu_test_in_subprocess("inner_dimensions_are_preserved");
    assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
}

#[test]
#[ignore = "requires a real GPU"]
fn constant_image_is_fixed_point() {
    let out = run_gpu_test_in_subprocess("inner_constant_image_is_fixed_point");
    assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
}

#[test]
#[ignore = "requires a real GPU"]
fn gpu_matches_cpu_reference_on_ragged_image() {
    let out = run_gpu_test_in_subprocess("inner_gpu_matches_cpu_reference_on_ragged_image");
    assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
}

#[test]
#[ignore = "requires a real GPU"]
fn broken_kernel_never_dispatches() {
    let out = run_gpu_test_in_subprocess("inner_broken_kernel_never_dispatches");
    assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
}
