use std::{
    cell::RefCell,
    collections::HashMap,
    path::{Path, PathBuf},
};

use chat_ocr::{
    ChatOcr, ChatOcrBuilder, OcrBackend, OcrError, PaddleEngineBuilder, ReplayBackend,
};
use image::{DynamicImage, RgbImage};
use serde_json::{json, Value};
use tempfile::TempDir;

/// Returns canned OCR output keyed by file name.
#[derive(Default)]
struct ScriptedBackend {
    results: HashMap<String, Value>,
    calls: RefCell<Vec<(String, bool)>>,
}

impl ScriptedBackend {
    fn with(mut self, file: &str, result: Value) -> Self {
        self.results.insert(file.to_string(), result);
        self
    }
}

impl OcrBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn ocr(&self, path: &Path, _: &DynamicImage, classify: bool) -> Result<Value, OcrError> {
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        self.calls.borrow_mut().push((name.clone(), classify));
        self.results
            .get(&name)
            .cloned()
            .ok_or_else(|| OcrError::output(format!("no script for {name}")))
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn screenshot(dir: &Path, name: &str, width: u32) -> PathBuf {
    let path = dir.join(name);
    RgbImage::new(width, 400)
        .save(&path)
        .expect("Failed to write test image");
    path
}

fn line(x0: f64, y0: f64, x1: f64, y1: f64, text: &str) -> Value {
    json!([[[x0, y0], [x1, y0], [x1, y1], [x0, y1]], [text, 0.95]])
}

fn conversation() -> Value {
    json!([[
        line(10.0, 10.0, 80.0, 22.0, "<晚上要吃什麼"),
        line(10.0, 15.0, 90.0, 27.0, "火鍋好嗎"),
        line(180.0, 300.0, 190.0, 330.0, "已讀"),
        line(150.0, 330.0, 190.0, 345.0, "下午 7:02"),
        line(120.0, 40.0, 190.0, 60.0, "好啊"),
    ]])
}

fn processor<B: OcrBackend>(backend: B) -> (ChatOcr<B>, TempDir, TempDir) {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let ocr = ChatOcrBuilder::new()
        .output_dir(output.path().join("OCR_output"))
        .build_with_backend(backend)
        .expect("Failed to build processor");
    (ocr, input, output)
}

fn saved_files(ocr: &ChatOcr<impl OcrBackend>) -> Vec<PathBuf> {
    std::fs::read_dir(ocr.output_dir())
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect()
}

#[test]
fn reconstructs_conversation_from_one_screenshot() {
    init_logging();
    let backend = ScriptedBackend::default().with("chat.png", conversation());
    let (ocr, input, _output) = processor(backend);
    screenshot(input.path(), "chat.png", 200);

    let transcript = ocr.process_images(input.path(), true);
    assert_eq!(transcript, "A: 晚上要吃什麼 A: 火鍋好嗎 \n我: 好啊 \n");
    assert_eq!(
        *ocr.backend().calls.borrow(),
        vec![("chat.png".to_string(), true)]
    );

    let saved = saved_files(&ocr);
    assert_eq!(saved.len(), 1);
    let name = saved[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("OCR_output_") && name.ends_with(".txt"));
    assert_eq!(name.len(), "OCR_output_20240101_120000.txt".len());
    assert_eq!(
        std::fs::read_to_string(&saved[0]).unwrap(),
        "A: 晚上要吃什麼 A: 火鍋好嗎 \n我: 好啊"
    );
}

#[test]
fn empty_directory_still_writes_a_file() {
    init_logging();
    let (ocr, input, _output) = processor(ScriptedBackend::default());

    assert_eq!(ocr.process_images(input.path(), true), "");
    let saved = saved_files(&ocr);
    assert_eq!(saved.len(), 1);
    assert_eq!(std::fs::read_to_string(&saved[0]).unwrap(), "");
}

#[test]
fn missing_directory_gives_empty_transcript() {
    init_logging();
    let (ocr, input, _output) = processor(ScriptedBackend::default());

    assert_eq!(ocr.process_images(input.path().join("missing"), false), "");
    assert!(saved_files(&ocr).is_empty());
}

#[test]
fn skips_undecodable_and_non_image_files() {
    init_logging();
    let backend = ScriptedBackend::default()
        .with("good.PNG", conversation())
        .with("broken.png", conversation());
    let (ocr, input, _output) = processor(backend);
    screenshot(input.path(), "good.PNG", 200);
    std::fs::write(input.path().join("broken.png"), b"not an image").unwrap();
    std::fs::write(input.path().join("notes.txt"), "火鍋").unwrap();

    let transcript = ocr.process_images(input.path(), false);
    assert_eq!(transcript, "A: 晚上要吃什麼 A: 火鍋好嗎 \n我: 好啊 \n");
    let calls = ocr.backend().calls.borrow();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "good.PNG");
}

#[test]
fn failed_or_malformed_ocr_contributes_nothing() {
    init_logging();
    let backend = ScriptedBackend::default().with("odd.jpg", json!({"error": "boom"}));
    let (ocr, input, _output) = processor(backend);
    screenshot(input.path(), "odd.jpg", 200);
    screenshot(input.path(), "unscripted.bmp", 200);

    assert_eq!(ocr.process_images(input.path(), false), "");
    assert_eq!(ocr.backend().calls.borrow().len(), 2);
}

#[test]
fn speaker_split_uses_each_image_width() {
    init_logging();
    let centred = json!([[line(90.0, 50.0, 110.0, 70.0, "在嗎")]]);
    let backend = ScriptedBackend::default()
        .with("narrow.png", centred.clone())
        .with("wide.png", centred);
    let (ocr, input, _output) = processor(backend);
    let narrow = screenshot(input.path(), "narrow.png", 200);
    let wide = screenshot(input.path(), "wide.png", 400);

    assert_eq!(ocr.process_image(&narrow).unwrap(), "我: 在嗎 \n");
    assert_eq!(ocr.process_image(&wide).unwrap(), "A: 在嗎 \n");

    let both = ocr.process_images(input.path(), false);
    assert!(both == "我: 在嗎 \nA: 在嗎 \n" || both == "A: 在嗎 \n我: 在嗎 \n");
}

#[test]
fn replays_captured_ocr_output() {
    init_logging();
    let (ocr, input, _output) = processor(ReplayBackend);
    screenshot(input.path(), "chat.webp.png", 200);
    std::fs::write(
        input.path().join("chat.webp.json"),
        serde_json::to_string(&conversation()).unwrap(),
    )
    .unwrap();
    screenshot(input.path(), "uncaptured.png", 200);

    let transcript = ocr.process_images(input.path(), false);
    assert_eq!(transcript, "A: 晚上要吃什麼 A: 火鍋好嗎 \n我: 好啊 \n");
}

#[test]
fn unwritable_output_does_not_lose_transcript() {
    init_logging();
    let backend = ScriptedBackend::default().with("chat.png", conversation());
    let (ocr, input, _output) = processor(backend);
    screenshot(input.path(), "chat.png", 200);
    std::fs::remove_dir_all(ocr.output_dir()).unwrap();
    std::fs::write(ocr.output_dir(), "a file where the directory was").unwrap();

    let transcript = ocr.process_images(input.path(), true);
    assert_eq!(transcript, "A: 晚上要吃什麼 A: 火鍋好嗎 \n我: 好啊 \n");
}

// Needs the PaddleOCR ONNX models and a sample screenshot under tests/data.
#[test]
#[ignore]
fn paddle_engine_reads_a_screenshot() {
    init_logging();
    let output = tempfile::tempdir().unwrap();
    let ocr = ChatOcrBuilder::new()
        .output_dir(output.path())
        .engine(
            PaddleEngineBuilder::new()
                .det_model("tests/data/models/det.onnx")
                .cls_model("tests/data/models/cls.onnx")
                .rec_model(
                    "tests/data/models/rec.onnx",
                    "tests/data/models/ppocr_keys_v1.txt",
                )
                .max_side_len(2048),
        )
        .build()
        .expect("Failed to build engine");

    let transcript = ocr
        .process_image(Path::new("tests/data/chat.png"))
        .expect("Failed to read test image");
    log::debug!("{transcript}");
    assert!(!transcript.trim().is_empty());
    assert!(transcript
        .lines()
        .all(|line| line.starts_with("A: ") || line.starts_with("我: ")));
}
