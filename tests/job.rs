mod common;

use common::{encrypt, media_playlist, MockTransport};
use m3u8_assembler::downloader::FailedSegment;
use m3u8_assembler::error::Error;
use m3u8_assembler::job::{run_job, DownloadJob, JobOptions, JobOutcome};
use m3u8_assembler::progress::SilentProgress;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::{tempdir, TempDir};
use url::Url;

const MANIFEST: &str = "https://example.com/show/index.m3u8";

fn job(out: &TempDir, name: &str) -> DownloadJob {
    DownloadJob {
        root_manifest_url: Url::parse(MANIFEST).unwrap(),
        destination_name: name.to_string(),
        output_dir: out.path().join("out"),
        skip_if_exists: false,
    }
}

fn options(root: &TempDir) -> JobOptions {
    JobOptions {
        workers: 4,
        temp_root: root.path().join("ts_temp"),
        ..JobOptions::default()
    }
}

fn seg(i: usize) -> String {
    format!("https://example.com/show/{}.ts", i)
}

#[tokio::test]
async fn merges_in_playlist_order_regardless_of_completion_order() {
    let transport = MockTransport::new();
    transport.serve(MANIFEST, media_playlist(&["0.ts", "1.ts", "2.ts"]));
    transport.serve_delayed(&seg(0), "A", Duration::from_millis(60));
    transport.serve_delayed(&seg(1), "B", Duration::from_millis(120));
    transport.serve_delayed(&seg(2), "C", Duration::from_millis(5));

    let dir = tempdir().unwrap();
    let job = job(&dir, "abc");
    let options = options(&dir);
    let outcome = run_job(transport.clone(), &job, &options, Arc::new(SilentProgress))
        .await
        .unwrap();

    let output = dir.path().join("out").join("abc.ts");
    assert_eq!(
        outcome,
        JobOutcome::Completed {
            output: output.clone(),
            segments: 3,
        }
    );
    let segment_order: Vec<_> = transport
        .completion_order()
        .into_iter()
        .filter(|u| u.ends_with(".ts"))
        .collect();
    assert_eq!(segment_order, vec![seg(2), seg(0), seg(1)]);
    assert_eq!(std::fs::read(&output).unwrap(), b"ABC");
    // 合并成功后删除临时目录
    assert!(!job.segments_dir(&options.temp_root).exists());
}

#[tokio::test]
async fn failed_segment_is_reported_and_nothing_is_merged() {
    let transport = MockTransport::new();
    let names: Vec<String> = (0..10).map(|i| format!("{}.ts", i)).collect();
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    transport.serve(MANIFEST, media_playlist(&names));
    for i in 0..10 {
        if i == 3 {
            transport.fail(&seg(i), 500);
        } else {
            transport.serve(&seg(i), format!("segment-{}", i));
        }
    }

    let dir = tempdir().unwrap();
    let job = job(&dir, "partial");
    let options = options(&dir);
    let outcome = run_job(transport.clone(), &job, &options, Arc::new(SilentProgress))
        .await
        .unwrap();

    let segments_dir = job.segments_dir(&options.temp_root);
    assert_eq!(
        outcome,
        JobOutcome::NeedsAttention {
            segments_dir: segments_dir.clone(),
            failed: vec![FailedSegment {
                index: 3,
                url: Url::parse(&seg(3)).unwrap(),
            }],
        }
    );
    for i in 0..10 {
        assert_eq!(transport.calls_to(&seg(i)), 1, "segment {} attempted once", i);
        assert_eq!(segments_dir.join(format!("{:05}.ts", i)).exists(), i != 3);
    }
    assert!(!dir.path().join("out").join("partial.ts").exists());
}

#[tokio::test]
async fn rerun_after_partial_failure_only_fetches_missing_segments() {
    let transport = MockTransport::new();
    transport.serve(MANIFEST, media_playlist(&["0.ts", "1.ts", "2.ts"]));
    transport.serve(&seg(0), "A");
    transport.fail(&seg(1), 503);
    transport.serve(&seg(2), "C");

    let dir = tempdir().unwrap();
    let job = job(&dir, "retry");
    let options = options(&dir);
    let first = run_job(transport.clone(), &job, &options, Arc::new(SilentProgress))
        .await
        .unwrap();
    assert!(matches!(first, JobOutcome::NeedsAttention { .. }));

    transport.serve(&seg(1), "B");
    let second = run_job(transport.clone(), &job, &options, Arc::new(SilentProgress))
        .await
        .unwrap();

    assert!(matches!(second, JobOutcome::Completed { segments: 3, .. }));
    assert_eq!(transport.calls_to(&seg(0)), 1);
    assert_eq!(transport.calls_to(&seg(1)), 2);
    assert_eq!(transport.calls_to(&seg(2)), 1);
    assert_eq!(
        std::fs::read(dir.path().join("out").join("retry.ts")).unwrap(),
        b"ABC"
    );
}

#[tokio::test]
async fn existing_artifact_is_skipped_without_any_request() {
    let transport = MockTransport::new();
    let dir = tempdir().unwrap();
    let mut job = job(&dir, "done");
    job.skip_if_exists = true;
    let output = dir.path().join("out").join("done.ts");
    std::fs::create_dir_all(output.parent().unwrap()).unwrap();
    std::fs::write(&output, b"already here").unwrap();

    let outcome = run_job(transport.clone(), &job, &options(&dir), Arc::new(SilentProgress))
        .await
        .unwrap();

    assert_eq!(outcome, JobOutcome::Skipped { output: output.clone() });
    assert!(transport.calls().is_empty());
    assert_eq!(std::fs::read(&output).unwrap(), b"already here");
}

#[tokio::test]
async fn encrypted_segments_are_decrypted_with_explicit_and_fallback_iv() {
    let key = b"0123456789abcdef";
    let iv = [0x11u8; 16];
    let manifest = format!(
        "#EXTM3U
#EXT-X-TARGETDURATION:10
#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\",IV=0x{}
#EXTINF:10,
0.ts
#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"
#EXTINF:10,
1.ts
#EXT-X-ENDLIST
",
        "11".repeat(16)
    );

    let transport = MockTransport::new();
    transport.serve(MANIFEST, manifest);
    transport.serve("https://example.com/show/key.bin", key.to_vec());
    transport.serve(&seg(0), encrypt(b"first segment payload", key, &iv));
    // 无IV时使用密钥本身作为IV
    transport.serve(&seg(1), encrypt(b"second", key, key));

    let dir = tempdir().unwrap();
    let outcome = run_job(
        transport.clone(),
        &job(&dir, "enc"),
        &options(&dir),
        Arc::new(SilentProgress),
    )
    .await
    .unwrap();

    assert!(matches!(outcome, JobOutcome::Completed { segments: 2, .. }));
    assert_eq!(transport.calls_to("https://example.com/show/key.bin"), 1);
    assert_eq!(
        std::fs::read(dir.path().join("out").join("enc.ts")).unwrap(),
        b"first segment payloadsecond"
    );
}

#[tokio::test]
async fn key_failure_aborts_before_any_segment_fetch() {
    let manifest = "#EXTM3U
#EXT-X-TARGETDURATION:10
#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"
#EXTINF:10,
0.ts
#EXT-X-ENDLIST
";
    let transport = MockTransport::new();
    transport.serve(MANIFEST, manifest);
    transport.fail("https://example.com/show/key.bin", 404);
    transport.serve(&seg(0), "A");

    let dir = tempdir().unwrap();
    let err = run_job(
        transport.clone(),
        &job(&dir, "nokey"),
        &options(&dir),
        Arc::new(SilentProgress),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::KeyFetch { .. }));
    assert_eq!(transport.calls_to(&seg(0)), 0);
    assert!(!dir.path().join("out").join("nokey.ts").exists());
}

#[tokio::test]
async fn malformed_manifest_aborts_job() {
    let transport = MockTransport::new();
    transport.serve(MANIFEST, "#EXTM3U\n#EXT-X-ENDLIST\n");

    let dir = tempdir().unwrap();
    let err = run_job(
        transport.clone(),
        &job(&dir, "empty"),
        &options(&dir),
        Arc::new(SilentProgress),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::MalformedManifest { .. }));
    assert_eq!(transport.calls().len(), 1);
}

#[tokio::test]
async fn segment_requests_carry_manifest_base_as_referer() {
    let transport = MockTransport::new();
    transport.serve(MANIFEST, media_playlist(&["0.ts"]));
    transport.serve(&seg(0), "A");

    let dir = tempdir().unwrap();
    run_job(
        transport.clone(),
        &job(&dir, "referer"),
        &options(&dir),
        Arc::new(SilentProgress),
    )
    .await
    .unwrap();

    let calls = transport.calls();
    let referers = transport.referers();
    let position = calls.iter().position(|u| *u == seg(0)).unwrap();
    assert_eq!(
        referers[position].as_deref(),
        Some("https://example.com/show/")
    );
}

#[tokio::test]
async fn keep_segments_leaves_working_directory() {
    let transport = MockTransport::new();
    transport.serve(MANIFEST, media_playlist(&["0.ts"]));
    transport.serve(&seg(0), "A");

    let dir = tempdir().unwrap();
    let job = job(&dir, "keep");
    let options = JobOptions {
        keep_segments: true,
        ..options(&dir)
    };
    run_job(transport.clone(), &job, &options, Arc::new(SilentProgress))
        .await
        .unwrap();

    let segments_dir = job.segments_dir(&options.temp_root);
    assert!(Path::new(&segments_dir.join("00000.ts")).exists());
}
