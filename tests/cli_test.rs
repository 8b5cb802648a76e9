use image::{GenericImageView, GrayImage, Luma};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct StepTiming {
    name: String,
    time_ms: u64,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct RunSummary {
    dims: Vec<usize>,
    polys: Option<Vec<Vec<[f32; 2]>>>,
    texts: Option<Vec<String>>,
    ignore_tags: Option<Vec<bool>>,
    shape: Option<[f32; 4]>,
    text_seq: Option<Vec<u32>>,
    valid_ratio: Option<f32>,
    total_time_ms: u64,
    steps: Vec<StepTiming>,
}

struct Fixture {
    dir: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        GrayImage::from_pixel(200, 100, Luma([200]))
            .save(dir.path().join("page.png"))
            .expect("Failed to write image fixture");
        fs::write(
            dir.path().join("label.json"),
            r#"[{"transcription": "edge", "points": [[150, 20], [210, 20], [210, 60], [150, 60]]}]"#,
        )
        .expect("Failed to write label fixture");
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write_pipeline(&self, json: &str) -> PathBuf {
        let path = self.path("pipeline.json");
        fs::write(&path, json).expect("Failed to write pipeline fixture");
        path
    }
}

fn run_cli(pipeline: &Path, image: &Path, extra: &[&str]) -> (bool, String, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_ocr-transforms"))
        .arg("--pipeline")
        .arg(pipeline)
        .arg("--image")
        .arg(image)
        .args(extra)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run ocr-transforms");
    (
        output.status.success(),
        String::from_utf8_lossy(&output.stdout).into_owned(),
        String::from_utf8_lossy(&output.stderr).into_owned(),
    )
}

#[test]
fn test_cli_crop_with_label() {
    let fixture = Fixture::new();
    let pipeline = fixture.write_pipeline(
        r#"{"transforms": [
            {"DecodeImage": {"img_mode": "RGB"}},
            {"RandomCropWithBBox": {"crop_size": [64, 64]}}
        ]}"#,
    );
    let label = fixture.path("label.json");
    let output = fixture.path("out.png");

    let (ok, stdout, stderr) = run_cli(
        &pipeline,
        &fixture.path("page.png"),
        &[
            "--label",
            label.to_str().unwrap(),
            "--seed",
            "7",
            "--output",
            output.to_str().unwrap(),
        ],
    );
    assert!(ok, "CLI failed: {}", stderr);

    let summary: RunSummary = serde_json::from_str(&stdout).expect("Failed to parse summary");
    assert_eq!(summary.dims, vec![64, 64]);
    assert_eq!(summary.texts.unwrap(), vec!["edge"]);
    assert_eq!(summary.steps.len(), 2);

    // polygon ran past the right edge and was clipped to the 64x32 content
    for [x, y] in summary.polys.unwrap().concat() {
        assert!((0.0..=64.0).contains(&x) && (0.0..=32.0).contains(&y));
    }

    let saved = image::open(&output).expect("Failed to open saved output");
    assert_eq!(saved.dimensions(), (64, 64));
}

#[test]
fn test_cli_recognition_crop() {
    let fixture = Fixture::new();
    let pipeline = fixture.write_pipeline(
        r#"{"transforms": [
            {"DecodeImage": {"img_mode": "RGB"}},
            {"Rotate90IfVertical": null},
            {"RecResizeImg": {"image_shape": [32, 100]}},
            {"RecCTCLabelEncode": {"max_text_len": 8}}
        ]}"#,
    );

    let (ok, stdout, stderr) =
        run_cli(&pipeline, &fixture.path("page.png"), &["--text", "Edge"]);
    assert!(ok, "CLI failed: {}", stderr);

    let summary: RunSummary = serde_json::from_str(&stdout).expect("Failed to parse summary");
    assert_eq!(summary.dims, vec![32, 100]);
    assert_eq!(summary.valid_ratio, Some(0.64));
    assert_eq!(summary.text_seq.unwrap(), vec![14, 13, 16, 14, 36, 36, 36, 36]);
}

#[test]
fn test_cli_reports_bad_config() {
    let fixture = Fixture::new();
    let pipeline = fixture.write_pipeline(r#"{"transforms": [{"ScalePadImage": {}}]}"#);

    let (ok, _, stderr) = run_cli(&pipeline, &fixture.path("page.png"), &[]);
    assert!(!ok);
    assert!(stderr.contains("ScalePadImage"), "stderr: {}", stderr);
}

#[test]
fn test_cli_missing_image() {
    let fixture = Fixture::new();
    let pipeline = fixture.write_pipeline(r#"{"transforms": [{"DecodeImage": null}]}"#);

    let (ok, _, _) = run_cli(&pipeline, &fixture.path("absent.png"), &[]);
    assert!(!ok);
}
