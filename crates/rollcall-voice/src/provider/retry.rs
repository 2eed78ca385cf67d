use std::time::Duration;

use super::SpeechProvider;
use crate::audio::PcmAudio;
use crate::error::VoiceError;

/// Fixed-delay retry policy for synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero behaves like one.
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

/// Audio plus the number of provider calls it took.
#[derive(Debug, Clone)]
pub struct Synthesized {
    pub audio: PcmAudio,
    pub attempts: u32,
}

/// Call `provider` until it yields non-empty audio or the policy is spent.
///
/// Empty audio and transport errors are retried after `policy.delay`. Any
/// other error stops immediately. Either way the failure surfaces as
/// [`VoiceError::SynthesisError`] carrying the attempt count.
pub async fn synthesize_with_retry(
    provider: &dyn SpeechProvider,
    text: &str,
    voice: &str,
    policy: RetryPolicy,
) -> Result<Synthesized, VoiceError> {
    let max_attempts = policy.attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let err = match provider.synthesize(text, voice).await {
            Ok(audio) if !audio.is_empty() => {
                return Ok(Synthesized {
                    audio,
                    attempts: attempt,
                });
            }
            Ok(_) => VoiceError::EmptyAudio,
            Err(e) => e,
        };

        if !err.is_retryable() || attempt >= max_attempts {
            return Err(VoiceError::SynthesisError {
                attempts: attempt,
                reason: err.to_string(),
            });
        }

        tracing::warn!(
            voice,
            attempt,
            max_attempts,
            error = %err,
            "Synthesis attempt failed, retrying"
        );
        tokio::time::sleep(policy.delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockSpeechProvider;

    fn fast() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_first_attempt_succeeds() {
        let mut provider = MockSpeechProvider::new();
        provider
            .expect_synthesize()
            .times(1)
            .returning(|_, _| Ok(PcmAudio::new(vec![0.1, 0.2], 16_000)));

        let out = synthesize_with_retry(&provider, "Alice", "v", fast())
            .await
            .unwrap();
        assert_eq!(out.attempts, 1);
        assert_eq!(out.audio.samples.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_audio_is_retried() {
        let mut provider = MockSpeechProvider::new();
        let mut seq = mockall::Sequence::new();
        provider
            .expect_synthesize()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(PcmAudio::new(Vec::new(), 16_000)));
        provider
            .expect_synthesize()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(PcmAudio::new(vec![0.3], 16_000)));

        let out = synthesize_with_retry(&provider, "Bob", "v", fast())
            .await
            .unwrap();
        assert_eq!(out.attempts, 3);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_attempts() {
        let mut provider = MockSpeechProvider::new();
        provider
            .expect_synthesize()
            .times(3)
            .returning(|_, _| Err(VoiceError::Transport("connection reset".into())));

        let err = synthesize_with_retry(&provider, "Carol", "v", fast())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            VoiceError::SynthesisError { attempts: 3, ref reason } if reason.contains("connection reset")
        ));
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let mut provider = MockSpeechProvider::new();
        provider.expect_synthesize().times(1).returning(|_, _| {
            Err(VoiceError::Provider {
                status: 400,
                message: "unknown voice".into(),
            })
        });

        let err = synthesize_with_retry(&provider, "Dan", "nope", fast())
            .await
            .unwrap_err();
        assert!(matches!(err, VoiceError::SynthesisError { attempts: 1, .. }));
    }
}
