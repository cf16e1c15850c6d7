use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};
use crate::media_shell::{CommandRunner, MediaShell};
use crate::metadata::SampledFrame;

/// 单个视频允许抽取的最大帧数
pub const MAX_FRAME_COUNT: usize = 10_000_000;

/// 时间点保留到微秒
const TIMESTAMP_SCALE: f64 = 1_000_000.0;

/// 时长 `duration` 内按 `interval` 能抽取的帧数，即 `floor(duration / interval)`
///
/// 商与整数的差在浮点误差内时按整数处理，`0.3 / 0.1` 得到 3 而不是 2。
pub fn frame_count(duration: f64, interval: f64) -> MediaResult<usize> {
    let quotient = duration / interval;
    if !quotient.is_finite() || quotient < 0.0 {
        return Err(MediaError::TooManyFrames { duration, interval });
    }

    let nearest = quotient.round();
    let count = if (quotient - nearest).abs() < 1e-9 * nearest.max(1.0) {
        nearest
    } else {
        quotient.floor()
    };

    if count > MAX_FRAME_COUNT as f64 {
        return Err(MediaError::TooManyFrames { duration, interval });
    }
    Ok(count as usize)
}

/// 第 `index` 帧的时间点（秒），去掉乘法带来的浮点尾数
pub fn frame_timestamp(index: usize, interval: f64) -> f64 {
    (index as f64 * interval * TIMESTAMP_SCALE).round() / TIMESTAMP_SCALE
}

/// 按固定间隔从视频中抽帧
///
/// 第 `i` 帧取自 `i * interval` 秒，依次写入 `output_dir/frame_<i>.jpg`。
/// 时长不足一个间隔时不抽帧直接返回。任何一帧失败都会中止整个过程。
pub fn sample_frames<R: CommandRunner>(
    shell: &MediaShell<R>,
    output_dir: impl AsRef<Path>,
    input: impl AsRef<Path>,
    interval: f64,
) -> MediaResult<Vec<SampledFrame>> {
    let output_dir = output_dir.as_ref();
    let input = input.as_ref();

    if !interval.is_finite() || interval <= 0.0 {
        return Err(MediaError::InvalidInterval(interval));
    }

    std::fs::create_dir_all(output_dir).map_err(|e| MediaError::Io {
        context: format!("创建输出目录失败: {}", output_dir.display()),
        source: e,
    })?;

    let duration = shell.probe_duration(input)?;
    let count = frame_count(duration, interval)?;
    info!(
        duration,
        interval,
        frames = count,
        "开始抽帧: {}",
        input.display()
    );

    let start = Instant::now();
    let mut frames = Vec::new();
    for index in 0..count {
        let timestamp = frame_timestamp(index, interval);
        let path = shell
            .extract_frame(output_dir, input, index, timestamp)
            .map_err(|e| MediaError::Sampling {
                input: input.to_path_buf(),
                timestamp,
                source: Box::new(e),
            })?;
        frames.push(SampledFrame {
            index,
            timestamp,
            path,
        });
    }

    debug!(elapsed_ms = start.elapsed().as_millis() as u64, "抽帧耗时");
    info!("抽帧完成，共 {} 帧: {}", frames.len(), output_dir.display());

    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media_shell::ToolPaths;
    use crate::testing::FakeRunner;

    fn shell(runner: FakeRunner) -> MediaShell<FakeRunner> {
        MediaShell::with_runner(runner, ToolPaths::default())
    }

    fn seek_times(shell: &MediaShell<FakeRunner>) -> Vec<String> {
        shell
            .runner()
            .calls_to("ffmpeg")
            .into_iter()
            .map(|c| c.args[1].clone())
            .collect()
    }

    #[test]
    fn test_frame_count() {
        assert_eq!(frame_count(10.0, 2.0).unwrap(), 5);
        assert_eq!(frame_count(2.5, 1.0).unwrap(), 2);
        assert_eq!(frame_count(0.9, 1.0).unwrap(), 0);
        assert_eq!(frame_count(0.0, 0.5).unwrap(), 0);
        assert_eq!(frame_count(0.3, 0.1).unwrap(), 3);
        assert_eq!(frame_count(0.7, 0.1).unwrap(), 7);
        assert_eq!(frame_count(0.29, 0.1).unwrap(), 2);
    }

    #[test]
    fn test_frame_count_decimal_intervals() {
        for millis in (100..=10_000u64).step_by(100) {
            for interval_millis in [100u64, 200, 300] {
                let duration = millis as f64 / 1000.0;
                let interval = interval_millis as f64 / 1000.0;
                assert_eq!(
                    frame_count(duration, interval).unwrap(),
                    (millis / interval_millis) as usize,
                    "duration {} interval {}",
                    duration,
                    interval
                );
            }
        }
    }

    #[test]
    fn test_frame_count_rejects_huge_quotient() {
        assert!(matches!(
            frame_count(5.0, 1e-30),
            Err(MediaError::TooManyFrames { .. })
        ));
        assert!(matches!(
            frame_count(f64::INFINITY, 1.0),
            Err(MediaError::TooManyFrames { .. })
        ));
    }

    #[test]
    fn test_frame_timestamp() {
        assert_eq!(frame_timestamp(3, 0.1).to_string(), "0.3");
        assert_eq!(frame_timestamp(6, 0.1).to_string(), "0.6");
        assert_eq!(frame_timestamp(4, 0.5).to_string(), "2");
    }

    #[test]
    fn test_samples_at_uniform_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("frames");
        let shell = shell(FakeRunner::new().with_duration_millis("2500"));

        let frames = sample_frames(&shell, &out, "clip.mp4", 0.5).unwrap();

        assert!(out.is_dir());
        assert_eq!(frames.len(), 5);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.index, i);
            assert_eq!(frame.timestamp, i as f64 * 0.5);
            assert_eq!(frame.path, out.join(format!("frame_{}.jpg", i)));
        }
        assert_eq!(seek_times(&shell), vec!["0", "0.5", "1", "1.5", "2"]);
    }

    #[test]
    fn test_extraction_count_matches_floor() {
        let dir = tempfile::tempdir().unwrap();
        let cases = [
            ("10000", 3.0, 3),
            ("9999", 1.0, 9),
            ("7000", 7.0, 1),
            ("300", 0.1, 3),
            ("600", 0.2, 3),
            ("1200", 0.1, 12),
        ];
        for (millis, interval, expected) in cases {
            let shell = shell(FakeRunner::new().with_duration_millis(millis));
            let frames = sample_frames(&shell, dir.path(), "clip.mp4", interval).unwrap();
            assert_eq!(frames.len(), expected);
            assert_eq!(shell.runner().calls_to("ffmpeg").len(), expected);
        }
    }

    #[test]
    fn test_decimal_interval_seek_times() {
        let dir = tempfile::tempdir().unwrap();
        let shell = shell(FakeRunner::new().with_duration_millis("700"));

        let frames = sample_frames(&shell, dir.path(), "clip.mp4", 0.1).unwrap();

        assert_eq!(frames.len(), 7);
        assert_eq!(frames[3].timestamp, 0.3);
        assert_eq!(
            seek_times(&shell),
            vec!["0", "0.1", "0.2", "0.3", "0.4", "0.5", "0.6"]
        );
    }

    #[test]
    fn test_tiny_interval_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let shell = shell(FakeRunner::new().with_duration_millis("5000"));

        let result = sample_frames(&shell, dir.path(), "clip.mp4", 1e-30);

        assert!(matches!(result, Err(MediaError::TooManyFrames { .. })));
        assert!(shell.runner().calls_to("ffmpeg").is_empty());
    }

    #[test]
    fn test_short_video_extracts_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let shell = shell(FakeRunner::new().with_duration_millis("900"));

        let frames = sample_frames(&shell, dir.path(), "clip.mp4", 1.0).unwrap();

        assert!(frames.is_empty());
        assert!(shell.runner().calls_to("ffmpeg").is_empty());
    }

    #[test]
    fn test_first_failure_aborts_with_context() {
        let dir = tempfile::tempdir().unwrap();
        let shell = shell(
            FakeRunner::new()
                .with_duration_millis("5000")
                .fail_ffmpeg_at_call(3),
        );

        let result = sample_frames(&shell, dir.path(), "clip.mp4", 1.0);

        match result {
            Err(MediaError::Sampling { input, timestamp, source }) => {
                assert_eq!(input, Path::new("clip.mp4"));
                assert_eq!(timestamp, 2.0);
                assert!(matches!(*source, MediaError::Extraction { .. }));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(shell.runner().calls_to("ffmpeg").len(), 3);
    }

    #[test]
    fn test_probe_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let shell = shell(FakeRunner::new().fail_program("mediainfo"));

        let result = sample_frames(&shell, dir.path(), "clip.mp4", 1.0);
        assert!(matches!(result, Err(MediaError::Probe { .. })));
    }

    #[test]
    fn test_rejects_non_positive_interval() {
        let dir = tempfile::tempdir().unwrap();
        let shell = shell(FakeRunner::new().with_duration_millis("5000"));

        for interval in [0.0, -1.0, f64::NAN] {
            let result = sample_frames(&shell, dir.path(), "clip.mp4", interval);
            assert!(matches!(result, Err(MediaError::InvalidInterval(_))));
        }
        assert!(shell.runner().calls().is_empty());
    }
}
