//! Translation of a NanoGPT SSE byte stream into [`StreamPart`] events.
//!
//! [`StreamTranslator`] is the synchronous state machine: feed it network
//! reads with [`push_bytes`](StreamTranslator::push_bytes) and close it with
//! [`finish`](StreamTranslator::finish). [`translate_stream`] drives it over
//! a live [`ByteStream`].
//!
//! Every translated stream starts with `stream-start` and ends with exactly
//! one `finish`. A `text-end` precedes `finish` whenever a text segment was
//! opened, and failures arrive as an in-band `error` event just before that
//! closing sequence.

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use serde_json::{Value, json};
use tracing::{trace, warn};

use crate::abort::AbortSignal;
use crate::error::{RequestError, code};
use crate::sse::{Frame, FrameBuffer, parse_frame};
use crate::transport::ByteStream;
use crate::types::{
    CallWarning, FinishReason, ProviderMetadata, StreamDelta, StreamPart, Usage,
    to_provider_metadata,
};

/// Prefix of generated text segment ids.
pub const TEXT_ID_PREFIX: &str = "nanogpt-text";

/// Generate a fresh text segment id.
pub fn new_text_id() -> String {
    format!("{TEXT_ID_PREFIX}-{}", uuid::Uuid::new_v4())
}

/// Per-call state of a streaming translation.
#[derive(Debug)]
pub struct StreamTranslator {
    buffer: FrameBuffer,
    text_id: String,
    include_raw: bool,
    text_open: bool,
    done: bool,
    finished: bool,
    finish_reason: FinishReason,
    usage: Usage,
    provider_metadata: Option<ProviderMetadata>,
}

impl StreamTranslator {
    /// Create a translator that labels its text segment `text_id`.
    ///
    /// With `include_raw` set, every payload is also passed through as a
    /// `raw` event.
    pub fn new(text_id: impl Into<String>, include_raw: bool) -> Self {
        Self {
            buffer: FrameBuffer::new(),
            text_id: text_id.into(),
            include_raw,
            text_open: false,
            done: false,
            finished: false,
            finish_reason: FinishReason::Unknown,
            usage: Usage::default(),
            provider_metadata: None,
        }
    }

    /// The opening event.
    pub fn stream_start(&self, warnings: Vec<CallWarning>) -> StreamPart {
        StreamPart::StreamStart { warnings }
    }

    /// Whether the `[DONE]` sentinel has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one network read and return the events it completes.
    ///
    /// All complete frames in the buffer are processed, including ones that
    /// follow the sentinel in the same read. Input after the sentinel read
    /// is ignored.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<StreamPart> {
        let mut out = Vec::new();
        if self.done || self.finished {
            return out;
        }
        self.buffer.push(bytes);
        while let Some(block) = self.buffer.next_block() {
            self.process_frame(&block, &mut out);
        }
        out
    }

    /// Close the stream and return the closing events.
    ///
    /// Without an error, a trailing partial frame is processed first. With
    /// an error, the buffered remainder is discarded and an `error` event
    /// leads the closing sequence. Calling this twice yields nothing the
    /// second time.
    pub fn finish(&mut self, error: Option<RequestError>) -> Vec<StreamPart> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }

        match error {
            None => {
                if let Some(rest) = self.buffer.finish() {
                    self.process_frame(&rest, &mut out);
                }
            }
            Some(error) => out.push(StreamPart::Error { error }),
        }

        if self.text_open {
            self.text_open = false;
            out.push(StreamPart::TextEnd {
                id: self.text_id.clone(),
            });
        }
        out.push(StreamPart::Finish {
            usage: self.usage,
            finish_reason: self.finish_reason,
            provider_metadata: self.provider_metadata.take(),
        });
        self.finished = true;
        out
    }

    fn process_frame(&mut self, block: &str, out: &mut Vec<StreamPart>) {
        let Some(frame) = parse_frame(block) else {
            return;
        };

        match frame {
            Frame::Metadata { raw, inner } => match serde_json::from_str::<Value>(&inner) {
                Ok(value) => {
                    if let Some(metadata) = to_provider_metadata(Some(&value)) {
                        self.provider_metadata = Some(metadata);
                    }
                    if self.include_raw {
                        out.push(StreamPart::Raw { raw_value: raw });
                    }
                }
                Err(e) => {
                    warn!(error = %e, "malformed NanoGPT metadata block");
                    out.push(StreamPart::Raw { raw_value: raw });
                }
            },
            Frame::Done => {
                trace!("stream sentinel received");
                self.done = true;
            }
            Frame::Data(payload) => {
                if self.include_raw {
                    out.push(StreamPart::Raw {
                        raw_value: payload.clone(),
                    });
                }
                match serde_json::from_str::<StreamDelta>(&payload) {
                    Ok(delta) => self.apply_delta(delta, out),
                    Err(e) => {
                        warn!(error = %e, "malformed stream payload");
                        out.push(StreamPart::Raw { raw_value: payload });
                    }
                }
            }
        }
    }

    fn apply_delta(&mut self, delta: StreamDelta, out: &mut Vec<StreamPart>) {
        let choice = delta.choices.and_then(|choices| choices.into_iter().next());

        if let Some(choice) = choice {
            if let Some(content) = choice.delta {
                for text in [content.content, content.reasoning].into_iter().flatten() {
                    self.emit_text(text, out);
                }
            }
            if let Some(reason) = choice.finish_reason.as_deref()
                && !reason.is_empty()
            {
                self.finish_reason = FinishReason::from_wire(Some(reason));
            }
        }

        if let Some(usage) = delta.usage {
            self.usage = usage.to_usage();
        }

        if let Some(metadata) = to_provider_metadata(delta.nano_gpt.as_ref()) {
            self.provider_metadata = Some(metadata);
        }
    }

    fn emit_text(&mut self, delta: String, out: &mut Vec<StreamPart>) {
        if delta.is_empty() {
            return;
        }
        if !self.text_open {
            self.text_open = true;
            out.push(StreamPart::TextStart {
                id: self.text_id.clone(),
            });
        }
        out.push(StreamPart::TextDelta {
            id: self.text_id.clone(),
            delta,
        });
    }
}

/// Settings for [`translate_stream`].
#[derive(Debug, Clone, Default)]
pub struct StreamOptions {
    /// Pass every payload through as a `raw` event.
    pub include_raw_chunks: bool,
    /// Text segment id; generated when `None`.
    pub text_id: Option<String>,
    /// Warnings reported in `stream-start`.
    pub warnings: Vec<CallWarning>,
    /// Aborting this signal ends the stream with a `request_aborted` error.
    pub signal: Option<AbortSignal>,
}

enum Read {
    Chunk(Option<Result<bytes::Bytes, RequestError>>),
    Aborted,
}

/// Translate a live SSE body into normalized events.
///
/// The returned stream is lazy and owns `body`; dropping it drops the
/// underlying reader.
pub fn translate_stream(body: ByteStream, options: StreamOptions) -> BoxStream<'static, StreamPart> {
    let StreamOptions {
        include_raw_chunks,
        text_id,
        warnings,
        signal,
    } = options;
    let signal = signal.unwrap_or_default();
    let text_id = text_id.unwrap_or_else(new_text_id);

    Box::pin(async_stream::stream! {
        let mut body = body;
        let mut translator = StreamTranslator::new(text_id, include_raw_chunks);
        yield translator.stream_start(warnings);

        let mut failure = None;
        while !translator.is_done() {
            let read = tokio::select! {
                biased;
                _ = signal.aborted() => Read::Aborted,
                chunk = body.next() => Read::Chunk(chunk),
            };

            match read {
                Read::Chunk(Some(Ok(bytes))) => {
                    for part in translator.push_bytes(&bytes) {
                        trace!(part = ?part, "stream part");
                        yield part;
                    }
                }
                Read::Chunk(Some(Err(err))) => {
                    warn!(code = %err.code, error = %err, "stream read failed");
                    failure = Some(err);
                    break;
                }
                Read::Chunk(None) => break,
                Read::Aborted => {
                    failure = Some(stream_aborted_error(&signal));
                    break;
                }
            }
        }
        drop(body);

        for part in translator.finish(failure) {
            trace!(part = ?part, "stream part");
            yield part;
        }
    })
}

fn stream_aborted_error(signal: &AbortSignal) -> RequestError {
    match signal.reason() {
        Some(reason) => RequestError::new(
            code::REQUEST_ABORTED,
            format!("Stream was aborted: {reason}"),
        )
        .with_details(json!({ "reason": reason })),
        None => RequestError::new(code::REQUEST_ABORTED, "Stream was aborted."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures_util::stream;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    const ID: &str = "nanogpt-text-test";

    fn translate_all(chunks: &[&str], include_raw: bool) -> Vec<StreamPart> {
        let mut translator = StreamTranslator::new(ID, include_raw);
        let mut parts = vec![translator.stream_start(vec![])];
        for chunk in chunks {
            parts.extend(translator.push_bytes(chunk.as_bytes()));
            if translator.is_done() {
                break;
            }
        }
        parts.extend(translator.finish(None));
        parts
    }

    fn body(chunks: Vec<Result<&'static str, RequestError>>) -> ByteStream {
        stream::iter(
            chunks
                .into_iter()
                .map(|c| c.map(|s| Bytes::from_static(s.as_bytes()))),
        )
        .boxed()
    }

    fn options() -> StreamOptions {
        StreamOptions {
            text_id: Some(ID.into()),
            ..StreamOptions::default()
        }
    }

    fn text_start() -> StreamPart {
        StreamPart::TextStart { id: ID.into() }
    }

    fn text_delta(delta: &str) -> StreamPart {
        StreamPart::TextDelta {
            id: ID.into(),
            delta: delta.into(),
        }
    }

    fn text_end() -> StreamPart {
        StreamPart::TextEnd { id: ID.into() }
    }

    fn finish_of(parts: &[StreamPart]) -> (Usage, FinishReason, Option<ProviderMetadata>) {
        match parts.last() {
            Some(StreamPart::Finish {
                usage,
                finish_reason,
                provider_metadata,
            }) => (*usage, *finish_reason, provider_metadata.clone()),
            other => panic!("expected finish, got {other:?}"),
        }
    }

    fn raws(parts: &[StreamPart]) -> Vec<&str> {
        parts
            .iter()
            .filter_map(|p| match p {
                StreamPart::Raw { raw_value } => Some(raw_value.as_str()),
                _ => None,
            })
            .collect()
    }

    // ── StreamTranslator ───────────────────────────────────────────

    #[test]
    fn hello_stop_sequence() {
        let parts = translate_all(
            &[
                "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n",
                "data: {\"choices\":[{\"finish_reason\":\"stop\"}],\"usage\":{\"prompt_tokens\":5,\"completion_tokens\":2,\"total_tokens\":7}}\n\n",
                "data: [DONE]\n\n",
            ],
            false,
        );

        assert_eq!(
            parts,
            vec![
                StreamPart::StreamStart { warnings: vec![] },
                text_start(),
                text_delta("Hello"),
                text_end(),
                StreamPart::Finish {
                    usage: Usage {
                        input_tokens: Some(5),
                        output_tokens: Some(2),
                        total_tokens: Some(7),
                        reasoning_tokens: None,
                        cached_input_tokens: None,
                    },
                    finish_reason: FinishReason::Stop,
                    provider_metadata: None,
                },
            ]
        );
    }

    #[test]
    fn mistyped_fields_do_not_drop_the_frame() {
        let parts = translate_all(
            &[
                "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}],\"usage\":{\"prompt_tokens\":5.0,\"completion_tokens\":1}}\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\" there\",\"reasoning\":{\"steps\":2}},\"finish_reason\":\"stop\"}]}\n\n",
                "data: [DONE]\n\n",
            ],
            false,
        );

        assert!(raws(&parts).is_empty());
        assert_eq!(
            parts[1..5],
            [text_start(), text_delta("Hi"), text_delta(" there"), text_end()]
        );
        let (usage, finish_reason, _) = finish_of(&parts);
        assert_eq!(usage.input_tokens, Some(5));
        assert_eq!(usage.output_tokens, Some(1));
        assert_eq!(finish_reason, FinishReason::Stop);
    }

    #[test]
    fn frames_split_across_reads() {
        let parts = translate_all(
            &[
                "data: {\"choices\":[{\"del",
                "ta\":{\"content\":\"Hi\"}}]}\n",
                "\ndata: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n\n",
            ],
            false,
        );
        assert_eq!(
            parts[1..4],
            [text_start(), text_delta("Hi"), text_delta(" there")]
        );
        assert_eq!(parts[4], text_end());
    }

    #[test]
    fn text_start_is_emitted_once() {
        let parts = translate_all(
            &[
                "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n\n",
            ],
            false,
        );
        let starts = parts
            .iter()
            .filter(|p| matches!(p, StreamPart::TextStart { .. }))
            .count();
        let ends = parts
            .iter()
            .filter(|p| matches!(p, StreamPart::TextEnd { .. }))
            .count();
        assert_eq!((starts, ends), (1, 1));
    }

    #[test]
    fn no_text_means_no_segment_events() {
        let parts = translate_all(
            &["data: {\"choices\":[{\"finish_reason\":\"length\"}]}\n\ndata: [DONE]\n\n"],
            false,
        );
        assert_eq!(parts.len(), 2);
        assert_eq!(finish_of(&parts).1, FinishReason::Length);
    }

    #[test]
    fn empty_deltas_are_skipped() {
        let parts = translate_all(
            &["data: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n\n"],
            false,
        );
        assert_eq!(parts.len(), 2);
    }

    #[test]
    fn reasoning_shares_the_text_segment() {
        let parts = translate_all(
            &[
                "data: {\"choices\":[{\"delta\":{\"reasoning\":\"think\"}}]}\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"answer\"}}]}\n\n",
            ],
            false,
        );
        assert_eq!(
            parts[1..5],
            [
                text_start(),
                text_delta("think"),
                text_delta("answer"),
                text_end()
            ]
        );
    }

    #[test]
    fn only_first_choice_is_used() {
        let parts = translate_all(
            &["data: {\"choices\":[{\"delta\":{\"content\":\"one\"}},{\"delta\":{\"content\":\"two\"}}]}\n\n"],
            false,
        );
        assert!(parts.contains(&text_delta("one")));
        assert!(!parts.contains(&text_delta("two")));
    }

    #[test]
    fn usage_is_replaced_not_merged() {
        let parts = translate_all(
            &[
                "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":5,\"completion_tokens\":1}}\n\n",
                "data: {\"choices\":[],\"usage\":{\"completion_tokens\":3}}\n\n",
            ],
            false,
        );
        let (usage, _, _) = finish_of(&parts);
        assert_eq!(usage.input_tokens, None);
        assert_eq!(usage.output_tokens, Some(3));
    }

    #[test]
    fn finish_reason_last_write_wins() {
        let parts = translate_all(
            &[
                "data: {\"choices\":[{\"finish_reason\":\"length\"}]}\n\n",
                "data: {\"choices\":[{\"finish_reason\":\"tool_calls\"}]}\n\n",
            ],
            false,
        );
        assert_eq!(finish_of(&parts).1, FinishReason::ToolCalls);
    }

    #[test]
    fn finish_reason_defaults_to_unknown() {
        let parts = translate_all(&["data: [DONE]\n\n"], false);
        let (usage, reason, metadata) = finish_of(&parts);
        assert_eq!(reason, FinishReason::Unknown);
        assert_eq!(usage, Usage::default());
        assert!(metadata.is_none());
    }

    #[test]
    fn metadata_block_sets_provider_metadata() {
        let parts = translate_all(
            &[
                "data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n\n",
                "<NanoGPT>{\"billing\":{\"usd\":0.02}}</NanoGPT>\n\n",
                "data: [DONE]\n\n",
            ],
            false,
        );
        let (_, _, metadata) = finish_of(&parts);
        assert_eq!(
            metadata,
            Some(BTreeMap::from([(
                "nanogpt".to_string(),
                json!({"billing": {"usd": 0.02}})
            )]))
        );
        assert!(raws(&parts).is_empty());
    }

    #[test]
    fn metadata_block_is_passed_through_when_raw_requested() {
        let parts = translate_all(&["<NanoGPT>{\"cost\":1}</NanoGPT>\n\n"], true);
        assert_eq!(raws(&parts), vec!["<NanoGPT>{\"cost\":1}</NanoGPT>"]);
    }

    #[test]
    fn malformed_metadata_block_becomes_raw() {
        let parts = translate_all(&["<NanoGPT>{oops</NanoGPT>\n\n"], false);
        assert_eq!(raws(&parts), vec!["<NanoGPT>{oops</NanoGPT>"]);
        assert!(finish_of(&parts).2.is_none());
    }

    #[test]
    fn non_object_metadata_is_ignored() {
        let parts = translate_all(&["<NanoGPT>42</NanoGPT>\n\n"], false);
        assert!(finish_of(&parts).2.is_none());
        assert!(raws(&parts).is_empty());
    }

    #[test]
    fn embedded_metadata_is_adopted() {
        let parts = translate_all(
            &[
                "<NanoGPT>{\"cost\":1}</NanoGPT>\n\n",
                "data: {\"choices\":[],\"nanoGPT\":{\"cost\":2}}\n\n",
            ],
            false,
        );
        let metadata = finish_of(&parts).2.unwrap();
        assert_eq!(metadata["nanogpt"], json!({"cost": 2}));
    }

    #[test]
    fn metadata_after_done_in_same_read_is_honoured() {
        let parts = translate_all(
            &["data: [DONE]\n\n<NanoGPT>{\"cost\":3}</NanoGPT>\n\n"],
            false,
        );
        assert_eq!(finish_of(&parts).2.unwrap()["nanogpt"], json!({"cost": 3}));
    }

    #[test]
    fn reads_after_done_are_ignored() {
        let mut translator = StreamTranslator::new(ID, false);
        translator.push_bytes(b"data: [DONE]\n\n");
        assert!(translator.is_done());
        let parts =
            translator.push_bytes(b"data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n\n");
        assert!(parts.is_empty());
    }

    #[test]
    fn malformed_json_becomes_raw_and_processing_continues() {
        let parts = translate_all(
            &[
                "data: {not json\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\n",
            ],
            false,
        );
        assert_eq!(raws(&parts), vec!["{not json"]);
        assert!(parts.contains(&text_delta("ok")));
        assert!(matches!(parts.last(), Some(StreamPart::Finish { .. })));
    }

    #[test]
    fn malformed_json_with_raw_requested_is_passed_twice() {
        let parts = translate_all(&["data: {bad\n\n"], true);
        assert_eq!(raws(&parts), vec!["{bad", "{bad"]);
    }

    #[test]
    fn raw_chunks_precede_their_deltas() {
        let payload = "{\"choices\":[{\"delta\":{\"content\":\"x\"}}]}";
        let parts = translate_all(&[format!("data: {payload}\n\n").as_str()], true);
        assert_eq!(
            parts[1..4],
            [
                StreamPart::Raw {
                    raw_value: payload.into()
                },
                text_start(),
                text_delta("x")
            ]
        );
    }

    #[test]
    fn comment_and_event_only_blocks_are_ignored() {
        let parts = translate_all(&[": ping\n\nevent: noop\n\n"], true);
        assert_eq!(parts.len(), 2);
    }

    #[test]
    fn trailing_partial_frame_is_processed_on_finish() {
        let parts = translate_all(
            &["data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}"],
            false,
        );
        assert_eq!(parts[1..4], [text_start(), text_delta("tail"), text_end()]);
    }

    #[test]
    fn error_precedes_text_end_and_finish() {
        let mut translator = StreamTranslator::new(ID, false);
        translator.push_bytes(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"lost\"}}]}");
        let error = RequestError::new(code::STREAM_READ_ERROR, "reset");
        let parts = translator.finish(Some(error.clone()));
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], StreamPart::Error { error });
        assert_eq!(parts[1], text_end());
        assert!(matches!(parts[2], StreamPart::Finish { .. }));
    }

    #[test]
    fn finish_is_idempotent() {
        let mut translator = StreamTranslator::new(ID, false);
        assert_eq!(translator.finish(None).len(), 1);
        assert!(translator.finish(None).is_empty());
    }

    #[test]
    fn text_ids_are_prefixed_and_unique() {
        let a = new_text_id();
        let b = new_text_id();
        assert!(a.starts_with("nanogpt-text-"));
        assert_ne!(a, b);
    }

    // ── translate_stream ───────────────────────────────────────────

    #[tokio::test]
    async fn translates_live_stream() {
        let parts: Vec<_> = translate_stream(
            body(vec![
                Ok("data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n"),
                Ok("data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n"),
                Ok("data: [DONE]\n\n"),
            ]),
            options(),
        )
        .collect()
        .await;

        assert_eq!(
            parts[..5],
            [
                StreamPart::StreamStart { warnings: vec![] },
                text_start(),
                text_delta("Hel"),
                text_delta("lo"),
                text_end(),
            ]
        );
        assert_eq!(parts.len(), 6);
    }

    #[tokio::test]
    async fn warnings_are_reported_in_stream_start() {
        let warning = CallWarning::UnsupportedSetting {
            setting: "toolChoice".into(),
            details: None,
        };
        let parts: Vec<_> = translate_stream(
            body(vec![]),
            StreamOptions {
                warnings: vec![warning.clone()],
                ..options()
            },
        )
        .collect()
        .await;
        assert_eq!(
            parts[0],
            StreamPart::StreamStart {
                warnings: vec![warning]
            }
        );
    }

    #[tokio::test]
    async fn stops_reading_after_done() {
        let parts: Vec<_> = translate_stream(
            body(vec![
                Ok("data: [DONE]\n\n"),
                Ok("data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n\n"),
            ]),
            options(),
        )
        .collect()
        .await;
        assert_eq!(parts.len(), 2);
    }

    #[tokio::test]
    async fn read_error_is_delivered_in_band() {
        let parts: Vec<_> = translate_stream(
            body(vec![
                Ok("data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n"),
                Err(RequestError::new(code::STREAM_READ_ERROR, "connection reset")),
            ]),
            options(),
        )
        .collect()
        .await;

        let n = parts.len();
        match &parts[n - 3] {
            StreamPart::Error { error } => assert_eq!(error.code, code::STREAM_READ_ERROR),
            other => panic!("expected error, got {other:?}"),
        }
        assert_eq!(parts[n - 2], text_end());
        assert!(matches!(parts[n - 1], StreamPart::Finish { .. }));
    }

    #[tokio::test]
    async fn abort_ends_stream_with_error_then_finish() {
        let signal = AbortSignal::new();
        let pending = stream::pending::<Result<Bytes, RequestError>>();
        let live = stream::iter(vec![Ok(Bytes::from_static(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n",
        ))])
        .chain(pending)
        .boxed();

        let mut out = translate_stream(
            live,
            StreamOptions {
                signal: Some(signal.clone()),
                ..options()
            },
        );

        assert!(matches!(out.next().await, Some(StreamPart::StreamStart { .. })));
        assert_eq!(out.next().await, Some(text_start()));
        assert_eq!(out.next().await, Some(text_delta("a")));

        signal.abort_with("user cancelled");
        match out.next().await {
            Some(StreamPart::Error { error }) => {
                assert_eq!(error.code, code::REQUEST_ABORTED);
                assert_eq!(error.details, Some(json!({"reason": "user cancelled"})));
            }
            other => panic!("expected error, got {other:?}"),
        }
        assert_eq!(out.next().await, Some(text_end()));
        assert!(matches!(out.next().await, Some(StreamPart::Finish { .. })));
        assert_eq!(out.next().await, None);
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn dropping_output_drops_reader() {
        let dropped = Arc::new(AtomicBool::new(false));
        let flag = DropFlag(dropped.clone());
        let live = stream::iter(vec![Ok(Bytes::from_static(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n",
        ))])
        .chain(stream::pending())
        .map(move |chunk| {
            let _keep = &flag;
            chunk
        })
        .boxed();

        let mut out = translate_stream(live, options());
        assert!(out.next().await.is_some());
        assert!(out.next().await.is_some());
        assert!(!dropped.load(Ordering::SeqCst));

        drop(out);
        assert!(dropped.load(Ordering::SeqCst));
    }
}
