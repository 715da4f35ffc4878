//! Integration tests for the protocol engine.
//!
//! These tests drive the public API against a scripted server that enforces
//! the order of client writes and server replies, so a client that reads
//! before it has finished writing (or writes before the server has answered)
//! fails the test instead of passing by accident.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

use postwire_imap::fetch::FetchRequest;
use postwire_imap::section::{DefaultSinkFactory, SectionKey, SectionStream, SinkFactory};
use postwire_imap::summary::MessageSummaryItems;
use postwire_imap::{
    Blocking, Capabilities, Capability, CollectingHandler, Command, Engine, EngineConfig, Error,
    FetchEvent, MessageId, MessageSet, ResponseCode, Section, SequenceSet, ServerType, Status, Uid,
    UidSet,
};

enum Step {
    Expect(Vec<u8>),
    Reply(Vec<u8>),
}

/// Scripted server: client writes must match the next `Expect` step exactly,
/// and replies become readable only once every earlier write has arrived.
struct Script {
    steps: VecDeque<Step>,
}

impl Script {
    fn new() -> Self {
        Self {
            steps: VecDeque::new(),
        }
    }

    fn expect(mut self, bytes: &[u8]) -> Self {
        self.steps.push_back(Step::Expect(bytes.to_vec()));
        self
    }

    fn reply(mut self, bytes: &[u8]) -> Self {
        self.steps.push_back(Step::Reply(bytes.to_vec()));
        self
    }

    fn pending(&self) -> String {
        match self.steps.front() {
            Some(Step::Expect(bytes)) => format!("expecting {:?}", String::from_utf8_lossy(bytes)),
            Some(Step::Reply(bytes)) => format!("about to send {:?}", String::from_utf8_lossy(bytes)),
            None => "finished".to_string(),
        }
    }
}

impl Read for Script {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if matches!(self.steps.front(), Some(Step::Expect(_))) {
            return Err(io::Error::other(format!(
                "client read while server was {}",
                self.pending()
            )));
        }
        match self.steps.front_mut() {
            None | Some(Step::Expect(_)) => Ok(0),
            Some(Step::Reply(data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                data.drain(..n);
                if data.is_empty() {
                    self.steps.pop_front();
                }
                Ok(n)
            }
        }
    }
}

impl Write for Script {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut src = buf;
        while !src.is_empty() {
            if !matches!(self.steps.front(), Some(Step::Expect(_))) {
                return Err(io::Error::other(format!(
                    "unexpected write {:?} while server was {}",
                    String::from_utf8_lossy(src),
                    self.pending()
                )));
            }
            let Some(Step::Expect(expected)) = self.steps.front_mut() else {
                break;
            };
            let n = expected.len().min(src.len());
            if expected[..n] != src[..n] {
                return Err(io::Error::other(format!(
                    "client wrote {:?}, server expected {:?}",
                    String::from_utf8_lossy(src),
                    String::from_utf8_lossy(expected)
                )));
            }
            expected.drain(..n);
            src = &src[n..];
            if expected.is_empty() {
                self.steps.pop_front();
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn engine(script: Script) -> Engine {
    init_tracing();
    Engine::new(Blocking::new(script), EngineConfig::default())
}

fn uid(n: u32) -> Uid {
    Uid::new(n).unwrap()
}

/// Records every committed section as `(uid, spec, bytes)`.
#[derive(Clone, Default)]
struct RecordingFactory {
    inner: DefaultSinkFactory,
    commits: Arc<Mutex<Vec<(u32, String, u64)>>>,
}

impl SinkFactory for RecordingFactory {
    fn create(&mut self, key: &SectionKey<'_>, len: usize) -> io::Result<SectionStream> {
        self.inner.create(key, len)
    }

    fn commit(&mut self, section: &Section) {
        self.commits.lock().unwrap().push((
            section.uid().map_or(0, Uid::get),
            section.spec().to_string(),
            section.len(),
        ));
    }
}

/// Wraps the engine's default storage and records which sections spilled.
struct SpillRecorder {
    inner: DefaultSinkFactory,
    spilled: Arc<Mutex<Vec<(String, bool)>>>,
}

impl SinkFactory for SpillRecorder {
    fn create(&mut self, key: &SectionKey<'_>, len: usize) -> io::Result<SectionStream> {
        self.spilled
            .lock()
            .unwrap()
            .push((key.spec.to_string(), self.inner.spills(len)));
        self.inner.create(key, len)
    }
}

#[tokio::test]
async fn test_configured_memory_threshold_spills_sections() {
    let script = Script::new()
        .expect(b"A0000 FETCH 1 (UID BODY.PEEK[1] BODY.PEEK[2])\r\n")
        .reply(b"* 1 FETCH (UID 4 BODY[1] {4}\r\nsmol BODY[2] {5}\r\nlarge)\r\n")
        .reply(b"A0000 OK done\r\n");
    init_tracing();
    let config = EngineConfig::builder().memory_threshold(4).build();
    let mut engine = Engine::new(Blocking::new(script), config);
    let inner = engine.sink_factory();
    assert_eq!(inner.memory_threshold(), 4);
    let spilled = Arc::new(Mutex::new(Vec::new()));
    let factory = SpillRecorder {
        inner,
        spilled: Arc::clone(&spilled),
    };
    let set = MessageSet::Seq(SequenceSet::single(1).unwrap());

    let mut outcome = engine.fetch_sections(&set, &["1", "2"], factory).await.unwrap();

    assert_eq!(
        *spilled.lock().unwrap(),
        vec![("1".to_string(), false), ("2".to_string(), true)]
    );
    let mut large = outcome
        .context
        .take(MessageId::Uid(uid(4)), "2", None)
        .unwrap();
    assert_eq!(large.read_to_vec().unwrap(), b"large");
}

#[tokio::test]
async fn test_partial_section_fetch() {
    let script = Script::new()
        .expect(b"A0000 UID FETCH 9 (UID BODY.PEEK[]<0.10>)\r\n")
        .reply(b"* 1 FETCH (UID 9 BODY[]<0> {10}\r\n0123456789)\r\n")
        .reply(b"A0000 OK FETCH completed\r\n");
    let mut engine = engine(script);

    let mut section = engine
        .fetch_section(
            MessageId::Uid(uid(9)),
            "",
            Some((0, 10)),
            DefaultSinkFactory::default(),
        )
        .await
        .unwrap();

    assert_eq!(section.uid(), Some(uid(9)));
    assert_eq!(section.origin(), Some(0));
    assert_eq!(section.read_to_vec().unwrap(), b"0123456789");
}

#[tokio::test]
async fn test_quoted_section_before_uid() {
    let script = Script::new()
        .expect(b"A0000 UID FETCH 9 (UID BODY.PEEK[TEXT])\r\n")
        .reply(b"* 2 FETCH (BODY[TEXT] \"hello\" UID 9)\r\n")
        .reply(b"A0000 OK done\r\n");
    let mut engine = engine(script);

    let mut section = engine
        .fetch_section(
            MessageId::Uid(uid(9)),
            "TEXT",
            None,
            DefaultSinkFactory::default(),
        )
        .await
        .unwrap();

    assert_eq!(section.seq().get(), 2);
    assert_eq!(section.uid(), Some(uid(9)));
    assert_eq!(section.read_to_vec().unwrap(), b"hello");
}

#[tokio::test]
async fn test_missing_section_is_not_found() {
    let script = Script::new()
        .expect(b"A0000 UID FETCH 9 (UID BODY.PEEK[1])\r\n")
        .reply(b"A0000 OK nothing matched\r\n");
    let mut engine = engine(script);

    let err = engine
        .fetch_section(MessageId::Uid(uid(9)), "1", None, DefaultSinkFactory::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NotFound(_)));
    assert!(!err.is_fatal());
    assert!(!engine.is_poisoned());
}

#[tokio::test]
async fn test_summary_lines_merge() {
    let script = Script::new()
        .expect(b"A0000 FETCH 1:2 (UID FLAGS)\r\n")
        .reply(b"* 1 FETCH (UID 10)\r\n")
        .reply(b"* 2 FETCH (UID 11 FLAGS (\\Seen))\r\n")
        .reply(b"* 1 FETCH (FLAGS (\\Flagged))\r\n")
        .reply(b"A0000 OK FETCH completed\r\n");
    let mut engine = engine(script);
    let set = MessageSet::Seq(SequenceSet::range(1, 2).unwrap());
    let request = FetchRequest::new(MessageSummaryItems::UNIQUE_ID | MessageSummaryItems::FLAGS);

    let summaries = engine.fetch_summaries(&set, &request).await.unwrap();

    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].seq.get(), 1);
    assert_eq!(summaries[0].uid, Some(uid(10)));
    assert!(summaries[0].flags.as_ref().unwrap().is_flagged());
    assert!(
        summaries[0]
            .items
            .contains(MessageSummaryItems::UNIQUE_ID | MessageSummaryItems::FLAGS)
    );
    assert_eq!(summaries[1].uid, Some(uid(11)));
    assert!(summaries[1].flags.as_ref().unwrap().is_seen());
}

#[tokio::test]
async fn test_exchange_greeting_tolerates_nil_body_structure() {
    let script = Script::new()
        .expect(b"A0000 UID FETCH 8 (UID BODYSTRUCTURE)\r\n")
        .reply(b"* 2 FETCH (UID 8 BODYSTRUCTURE NIL)\r\n")
        .reply(b"A0000 OK FETCH completed.\r\n");
    let mut engine =
        engine(script).with_greeting("* OK The Microsoft Exchange IMAP4 service is ready.");
    assert_eq!(engine.quirks().server_type, ServerType::Exchange);

    let set = MessageSet::Uid(UidSet::single(uid(8)));
    let request =
        FetchRequest::new(MessageSummaryItems::UNIQUE_ID | MessageSummaryItems::BODY_STRUCTURE);
    let summaries = engine.fetch_summaries(&set, &request).await.unwrap();

    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].uid, Some(uid(8)));
    assert!(summaries[0].body.is_none());
    assert!(!summaries[0].items.contains(MessageSummaryItems::BODY_STRUCTURE));
}

#[tokio::test]
async fn test_nil_body_structure_fails_without_greeting() {
    let script = Script::new()
        .expect(b"A0000 UID FETCH 8 (UID BODYSTRUCTURE)\r\n")
        .reply(b"* 2 FETCH (UID 8 BODYSTRUCTURE NIL)\r\n")
        .reply(b"A0000 OK FETCH completed.\r\n");
    let mut engine = engine(script);
    let set = MessageSet::Uid(UidSet::single(uid(8)));
    let request =
        FetchRequest::new(MessageSummaryItems::UNIQUE_ID | MessageSummaryItems::BODY_STRUCTURE);

    let err = engine.fetch_summaries(&set, &request).await.unwrap_err();

    assert!(matches!(err, Error::Protocol { .. }));
    assert!(engine.is_poisoned());
}

#[tokio::test]
async fn test_summary_headers_and_envelope() {
    let script = Script::new()
        .expect(b"A0000 UID FETCH 5 (UID ENVELOPE BODY.PEEK[HEADER.FIELDS (Subject)])\r\n")
        .reply(
            b"* 3 FETCH (UID 5 ENVELOPE (NIL \"Lunch\" NIL NIL NIL NIL NIL NIL NIL NIL) \
              BODY[HEADER.FIELDS (SUBJECT)] {16}\r\nSubject: Lunch\r\n)\r\n",
        )
        .reply(b"A0000 OK done\r\n");
    let mut engine = engine(script);
    let set = MessageSet::Uid(UidSet::single(uid(5)));
    let request = FetchRequest::new(MessageSummaryItems::UNIQUE_ID | MessageSummaryItems::ENVELOPE)
        .header_fields(["Subject"]);

    let summaries = engine.fetch_summaries(&set, &request).await.unwrap();

    assert_eq!(summaries.len(), 1);
    let summary = &summaries[0];
    assert_eq!(
        summary.envelope.as_ref().unwrap().subject.as_deref(),
        Some("Lunch")
    );
    assert_eq!(
        summary.headers.as_ref().unwrap().get("subject"),
        Some("Lunch")
    );
}

#[tokio::test]
async fn test_sections_with_events_and_single_commit() {
    let script = Script::new()
        .expect(b"A0000 FETCH 1 (UID BODY.PEEK[HEADER] BODY.PEEK[TEXT])\r\n")
        .reply(b"* 1 FETCH (FLAGS (\\Seen) BODY[HEADER] {4}\r\nH: v")
        .reply(b" BODY[TEXT] \"first\" BODY[TEXT] \"second\" UID 42)\r\n")
        .reply(b"A0000 OK done\r\n");
    let mut engine = engine(script);
    let factory = RecordingFactory::default();
    let commits = Arc::clone(&factory.commits);
    let set = MessageSet::Seq(SequenceSet::single(1).unwrap());

    let mut outcome = engine
        .fetch_sections(&set, &["HEADER", "TEXT"], factory)
        .await
        .unwrap();

    assert_eq!(outcome.context.len(), 2);
    let mut text = outcome
        .context
        .take(MessageId::Uid(uid(42)), "text", None)
        .unwrap();
    assert_eq!(text.read_to_vec().unwrap(), b"second");

    let commits = commits.lock().unwrap();
    assert_eq!(commits.len(), 2);
    assert!(commits.contains(&(42, "HEADER".to_string(), 4)));
    assert!(commits.contains(&(42, "TEXT".to_string(), 6)));

    assert_eq!(outcome.events.len(), 1);
    match &outcome.events[0] {
        FetchEvent::FlagsChanged { uid: Some(u), flags, .. } => {
            assert_eq!(*u, uid(42));
            assert!(flags.is_seen());
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_pipelined_commands_written_back_to_back() {
    let script = Script::new()
        .expect(b"A0000 NOOP\r\nA0001 CHECK\r\nA0002 NOOP\r\n")
        .reply(b"A0000 OK one\r\nA0001 OK two\r\nA0002 OK three\r\n");
    let mut engine = engine(script);

    let first = engine.enqueue(Command::builder("NOOP").build()).unwrap();
    let second = engine.enqueue(Command::builder("CHECK").build()).unwrap();
    let third = engine.enqueue(Command::builder("NOOP").build()).unwrap();

    let third = engine.run(&third).await.unwrap();
    let first = engine.run(&first).await.unwrap();
    let second = engine.run(&second).await.unwrap();

    assert_eq!(first.text(), "one");
    assert_eq!(second.text(), "two");
    assert_eq!(third.text(), "three");
}

#[tokio::test]
async fn test_exclusive_command_waits_for_completion() {
    let script = Script::new()
        .expect(b"A0000 SELECT INBOX\r\n")
        .reply(b"* 3 EXISTS\r\nA0000 OK [READ-WRITE] selected\r\n")
        .expect(b"A0001 NOOP\r\n")
        .reply(b"A0001 OK\r\n");
    let mut engine = engine(script).with_unsolicited_handler(CollectingHandler::new());

    let select = engine
        .enqueue(Command::builder("SELECT").mailbox("INBOX").exclusive().build())
        .unwrap();
    let noop = engine.enqueue(Command::builder("NOOP").build()).unwrap();

    let select = engine.run(&select).await.unwrap();
    assert_eq!(select.response_code(), Some(&ResponseCode::ReadWrite));
    engine.run(&noop).await.unwrap().check().unwrap();
}

#[tokio::test]
async fn test_synchronizing_literal_waits_for_continuation() {
    let script = Script::new()
        .expect(b"A0000 APPEND INBOX {5}\r\n")
        .reply(b"+ Ready for literal data\r\n")
        .expect(b"hello\r\n")
        .reply(b"A0000 OK APPEND completed\r\n");
    let mut engine = engine(script);

    let command = Command::builder("APPEND")
        .mailbox("INBOX")
        .literal(b"hello")
        .build();
    let command = engine.execute(command).await.unwrap();

    assert_eq!(command.status(), Some(Status::Ok));
}

#[tokio::test]
async fn test_literal_plus_sent_eagerly() {
    let script = Script::new()
        .expect(b"A0000 APPEND INBOX {5+}\r\nhello\r\n")
        .reply(b"A0000 OK APPEND completed\r\n");
    let mut engine =
        engine(script).with_capabilities(Capabilities::parse_list("IMAP4rev1 LITERAL+"));

    let command = Command::builder("APPEND")
        .mailbox("INBOX")
        .literal(b"hello")
        .build();

    engine.execute(command).await.unwrap().check().unwrap();
}

#[tokio::test]
async fn test_missing_capability_writes_nothing() {
    // Any write fails the script.
    let mut engine = engine(Script::new());
    let set = MessageSet::Seq(SequenceSet::All);
    let request = FetchRequest::new(MessageSummaryItems::MOD_SEQ);

    let err = engine.fetch_summaries(&set, &request).await.unwrap_err();

    assert!(matches!(err, Error::MissingCapability(Capability::CondStore)));
    assert!(!engine.is_poisoned());
}

#[tokio::test]
async fn test_no_completion_carries_response_code() {
    let script = Script::new()
        .expect(b"A0000 SELECT Missing\r\n")
        .reply(b"A0000 NO [TRYCREATE] no such mailbox\r\n");
    let mut engine = engine(script);

    let command = engine
        .execute(Command::builder("SELECT").mailbox("Missing").build())
        .await
        .unwrap();
    let err = command.check().unwrap_err();

    match &err {
        Error::Command { status, text, .. } => {
            assert_eq!(*status, Status::No);
            assert_eq!(text, "no such mailbox");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(err.response_code(), Some(&ResponseCode::TryCreate));
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn test_cancelled_command_poisons_engine() {
    let mut engine = engine(Script::new());
    let command = Command::builder("NOOP").build();
    command.cancel();

    let err = engine.execute(command).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert!(engine.is_poisoned());

    let err = engine
        .execute(Command::builder("NOOP").build())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Poisoned));
}

#[tokio::test]
async fn test_unsolicited_expunge_during_fetch() {
    let script = Script::new()
        .expect(b"A0000 FETCH 1 (FLAGS)\r\n")
        .reply(b"* 4 EXPUNGE\r\n* 1 FETCH (FLAGS ())\r\nA0000 OK done\r\n");
    let mut engine = engine(script).with_unsolicited_handler(CollectingHandler::new());
    let set = MessageSet::Seq(SequenceSet::single(1).unwrap());

    let summaries = engine
        .fetch_summaries(&set, &FetchRequest::new(MessageSummaryItems::FLAGS))
        .await
        .unwrap();

    assert_eq!(summaries.len(), 1);
    assert!(summaries[0].flags.as_ref().unwrap().is_empty());
}

#[test]
fn test_blocking_summary_fetch() {
    let script = Script::new()
        .expect(b"A0000 FETCH 7 (UID RFC822.SIZE)\r\n")
        .reply(b"* 7 FETCH (UID 70 RFC822.SIZE 1234)\r\nA0000 OK\r\n");
    let mut engine = engine(script);
    let set = MessageSet::Seq(SequenceSet::single(7).unwrap());
    let request = FetchRequest::new(MessageSummaryItems::UNIQUE_ID | MessageSummaryItems::SIZE);

    let summaries = engine.fetch_summaries_blocking(&set, &request).unwrap();

    assert_eq!(summaries[0].uid, Some(uid(70)));
    assert_eq!(summaries[0].size, Some(1234));
}

#[test]
fn test_blocking_section_fetch() {
    let script = Script::new()
        .expect(b"A0000 FETCH 1 (UID BODY.PEEK[1])\r\n")
        .reply(b"* 1 FETCH (UID 3 BODY[1] {3}\r\nabc)\r\nA0000 OK\r\n");
    let mut engine = engine(script);
    let seq = postwire_imap::SeqNum::new(1).unwrap();

    let mut section = engine
        .fetch_section_blocking(MessageId::Seq(seq), "1", None, DefaultSinkFactory::default())
        .unwrap();

    assert_eq!(section.read_to_vec().unwrap(), b"abc");
}
