use log::LevelFilter;
use std::path::Path;

use mailmerge_lib::{
    recovery, Dispatcher, DoneMarker, HeaderPoll, MemoryMailService, MergeConfig, RecordingSleeper,
    Recovery, Row, RunDescriptor, RunSummary, SendMode, Status, Table,
};

fn init_logger() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(LevelFilter::Debug)
        .try_init();
}

fn config(mode: SendMode) -> MergeConfig {
    MergeConfig {
        from: "me@localhost.com".into(),
        subject: "Hello {Name}".into(),
        body: "Dear **{Name}**,\nsee [the docs](https://example.com/docs).".into(),
        label: "Mail Merge Sent".into(),
        delay: 20,
        mode,
        ..MergeConfig::default()
    }
}

fn table(rows: &[(&str, &str)]) -> Table {
    Table::from_rows(
        rows.iter()
            .map(|(email, name)| Row::from_iter([("Email", *email), ("Name", *name)])),
    )
}

fn run_pass(
    service: &mut MemoryMailService,
    sleeper: &mut RecordingSleeper,
    dir: &Path,
    run: &mut RunDescriptor,
) -> RunSummary {
    Dispatcher::new(service)
        .sleeper(sleeper)
        .header_poll(HeaderPoll {
            attempts: 3,
            backoff: 0.0..=0.0,
        })
        .output_dir(dir.join("out"))
        .done_marker(dir.join("done.json"))
        .checkpoint(dir.join("run.json"))
        .run(run)
        .unwrap()
}

fn statuses(table: &Table) -> Vec<Status> {
    table.rows().iter().map(Row::status).collect()
}

#[test]
fn test_three_rows_scenario() {
    init_logger();

    let dir = tempfile::tempdir().unwrap();
    let mut service = MemoryMailService::default();
    let mut sleeper = RecordingSleeper::default();
    let mut run = RunDescriptor::new(
        table(&[("a@x.com", "Al"), ("bad", "Bo"), ("c@x.com", "Cy")]),
        &config(SendMode::NewMessage),
    );

    let summary = run_pass(&mut service, &mut sleeper, dir.path(), &mut run);

    assert_eq!(2, summary.sent);
    assert_eq!(vec![String::from("bad")], summary.skipped);
    assert!(summary.errors.is_empty());
    assert!(summary.is_clean());
    assert!(!summary.capped);
    assert_eq!(
        vec![Status::Sent, Status::Skipped, Status::Sent],
        statuses(&run.table)
    );
    assert!(run.table.rows().iter().all(|row| row.status().is_terminal()));

    // correlation ids
    for (index, msg) in [(0, &service.sent[0]), (2, &service.sent[1])] {
        let row = run.table.row(index).unwrap();
        assert_eq!(msg.thread_id, row.thread_id());
        assert_eq!(msg.message_id, row.rfc_message_id());
    }
    assert!(run.table.row(1).unwrap().thread_id().is_empty());

    // rendered messages
    assert_eq!("a@x.com", service.sent[0].to);
    assert_eq!("Hello Al", service.sent[0].subject);
    assert_eq!(None, service.sent[0].in_reply_to);
    let body = mailparse::parse_mail(&service.sent[1].raw)
        .unwrap()
        .get_body()
        .unwrap();
    assert!(body.contains("Dear <b>Cy</b>,<br>"));
    assert!(body.contains(r#"<a href="https://example.com/docs""#));

    // label
    assert_eq!(1, service.labels.len());
    let label_id = &service.labels[0].id;
    assert_eq!(
        &vec![service.sent[0].id.clone(), service.sent[1].id.clone()],
        service.labeled.get(label_id).unwrap()
    );

    // artifact, backup and marker
    let artifact = summary.artifact.unwrap();
    assert!(artifact.starts_with(dir.path().join("out")));
    let file_name = artifact.file_name().unwrap().to_string_lossy().to_string();
    assert!(file_name.starts_with("Updated_Mail_Merge_Sent_"));
    assert!(file_name.ends_with(".csv"));

    let saved = Table::from_csv_path(&artifact).unwrap();
    assert_eq!(statuses(&run.table), statuses(&saved));
    assert_eq!(run.table.row(0).unwrap().rfc_message_id(), saved.row(0).unwrap().rfc_message_id());

    assert_eq!(1, service.backups.len());
    assert_eq!(file_name, service.backups[0].0);

    let marker = DoneMarker::read(&dir.path().join("done.json")).unwrap().unwrap();
    assert_eq!(artifact, marker.file);
    assert!(!dir.path().join("run.json").exists());
}

#[test]
fn test_completed_table_is_idempotent() {
    init_logger();

    let dir = tempfile::tempdir().unwrap();
    let mut service = MemoryMailService::default();
    let mut sleeper = RecordingSleeper::default();
    let mut run = RunDescriptor::new(
        table(&[("a@x.com", "Al"), ("b@x.com", "Bo")]),
        &config(SendMode::NewMessage),
    );

    run_pass(&mut service, &mut sleeper, dir.path(), &mut run);
    let table = run.table.clone();
    let requests = service.requests;
    recovery::reset(&dir.path().join("done.json"), &dir.path().join("run.json")).unwrap();

    let summary = run_pass(&mut service, &mut sleeper, dir.path(), &mut run);

    assert_eq!(0, summary.processed());
    assert_eq!(None, summary.artifact);
    assert_eq!(requests, service.requests);
    assert_eq!(2, service.sent.len());
    assert_eq!(table, run.table);
    assert!(!dir.path().join("done.json").exists());
}

#[test]
fn test_pacing_bounds() {
    init_logger();

    let dir = tempfile::tempdir().unwrap();
    let mut service = MemoryMailService::default().fail_for("b@x.com");
    let mut sleeper = RecordingSleeper::default();
    let mut run = RunDescriptor::new(
        table(&[
            ("a@x.com", "Al"),
            ("b@x.com", "Bo"),
            ("", "Nobody"),
            ("c@x.com", "Cy"),
        ]),
        &config(SendMode::NewMessage),
    );

    let summary = run_pass(&mut service, &mut sleeper, dir.path(), &mut run);

    assert_eq!(2, summary.sent);
    assert_eq!(1, summary.errors.len());
    assert_eq!(1, summary.skipped.len());

    // one wait between each pair of dispatch attempts, errors included
    assert_eq!(2, sleeper.waits.len());
    for wait in &sleeper.waits {
        let secs = wait.as_secs_f64();
        assert!((18.0 - 1e-6..=22.0 + 1e-6).contains(&secs), "{}", secs);
    }
    let total = sleeper.total().as_secs_f64();
    assert!((36.0 - 1e-6..=44.0 + 1e-6).contains(&total), "{}", total);
}

#[test]
fn test_batch_cap() {
    init_logger();

    let dir = tempfile::tempdir().unwrap();
    let mut service = MemoryMailService::default();
    let mut sleeper = RecordingSleeper::default();
    let config = MergeConfig {
        batch_cap: 2,
        ..config(SendMode::NewMessage)
    };
    let mut run = RunDescriptor::new(
        table(&[
            ("a@x.com", "Al"),
            ("b@x.com", "Bo"),
            ("c@x.com", "Cy"),
            ("d@x.com", "Di"),
            ("e@x.com", "Ed"),
        ]),
        &config,
    );

    let summary = run_pass(&mut service, &mut sleeper, dir.path(), &mut run);

    assert!(summary.capped);
    assert_eq!(2, summary.sent);
    assert_eq!(2, service.sent.len());
    assert_eq!(
        vec![
            Status::Sent,
            Status::Sent,
            Status::Pending,
            Status::Pending,
            Status::Pending
        ],
        statuses(&run.table)
    );
    assert_eq!(vec![2, 3, 4], run.pending);
    assert_eq!(1, sleeper.waits.len());
}

#[test]
fn test_draft_mode_ignores_batch_cap() {
    init_logger();

    let dir = tempfile::tempdir().unwrap();
    let mut service = MemoryMailService::default();
    let mut sleeper = RecordingSleeper::default();
    let config = MergeConfig {
        batch_cap: 1,
        ..config(SendMode::Draft)
    };
    let mut run = RunDescriptor::new(
        table(&[("a@x.com", "Al"), ("b@x.com", "Bo"), ("c@x.com", "Cy")]),
        &config,
    );

    let summary = run_pass(&mut service, &mut sleeper, dir.path(), &mut run);

    assert!(!summary.capped);
    assert_eq!(3, summary.drafted);
    assert_eq!(3, service.drafts.len());
    assert!(service.sent.is_empty());
    assert_eq!(vec![Status::Draft; 3], statuses(&run.table));
    assert!(service.backups.is_empty());
    assert!(!dir.path().join("done.json").exists());

    // drafts stay pending for a later send
    assert_eq!(vec![0, 1, 2], run.pending);
}

#[test]
fn test_reply_mode() {
    init_logger();

    let dir = tempfile::tempdir().unwrap();
    let mut service = MemoryMailService::default();
    let mut sleeper = RecordingSleeper::default();
    let table = Table::from_rows([
        Row::from_iter([
            ("Email", "a@x.com"),
            ("Name", "Al"),
            ("ThreadId", "thread-a"),
            ("RfcMessageId", "<first-a@x.com>"),
            ("Status", "Draft"),
        ]),
        Row::from_iter([
            ("Email", "b@x.com"),
            ("Name", "Bo"),
            ("ThreadId", "thread-b"),
            ("RfcMessageId", ""),
        ]),
    ]);
    let mut run = RunDescriptor::new(table, &config(SendMode::Reply));

    let summary = run_pass(&mut service, &mut sleeper, dir.path(), &mut run);
    assert_eq!(2, summary.sent);

    let reply = &service.sent[0];
    assert_eq!("thread-a", reply.thread_id);
    assert_eq!(Some("<first-a@x.com>"), reply.in_reply_to.as_deref());
    assert_eq!(Some("<first-a@x.com>"), reply.references.as_deref());
    let row = run.table.row(0).unwrap();
    assert_eq!("thread-a", row.thread_id());
    assert_eq!(reply.message_id, row.rfc_message_id());

    // incomplete conversation: unthreaded message
    let fresh = &service.sent[1];
    assert_ne!("thread-b", fresh.thread_id);
    assert_eq!(None, fresh.in_reply_to);
    assert_eq!(fresh.thread_id, run.table.row(1).unwrap().thread_id());
}

#[test]
fn test_new_message_mode_ignores_conversation() {
    init_logger();

    let dir = tempfile::tempdir().unwrap();
    let mut service = MemoryMailService::default();
    let mut sleeper = RecordingSleeper::default();
    let table = Table::from_rows([Row::from_iter([
        ("Email", "a@x.com"),
        ("Name", "Al"),
        ("ThreadId", "thread-a"),
        ("RfcMessageId", "<first-a@x.com>"),
    ])]);
    let mut run = RunDescriptor::new(table, &config(SendMode::NewMessage));

    run_pass(&mut service, &mut sleeper, dir.path(), &mut run);

    assert_ne!("thread-a", service.sent[0].thread_id);
    assert_eq!(None, service.sent[0].in_reply_to);
}

#[test]
fn test_errors_keep_correlation_ids() {
    init_logger();

    let dir = tempfile::tempdir().unwrap();
    let mut service = MemoryMailService::default().fail_for("a@x.com");
    let mut sleeper = RecordingSleeper::default();
    let table = Table::from_rows([Row::from_iter([
        ("Email", "Al <a@x.com>"),
        ("Name", "Al"),
        ("ThreadId", "thread-a"),
        ("RfcMessageId", "<first-a@x.com>"),
    ])]);
    let mut run = RunDescriptor::new(table, &config(SendMode::Reply));

    let summary = run_pass(&mut service, &mut sleeper, dir.path(), &mut run);

    assert_eq!(0, summary.sent);
    assert_eq!(1, summary.errors.len());
    assert_eq!("a@x.com", summary.errors[0].0);
    assert!(summary.errors[0].1.contains("rejected"));

    let row = run.table.row(0).unwrap();
    assert_eq!(Status::Error, row.status());
    assert_eq!("thread-a", row.thread_id());
    assert_eq!("<first-a@x.com>", row.rfc_message_id());

    // errored rows are retried by the next pass
    assert_eq!(vec![0], run.pending);
}

#[test]
fn test_render_errors_fall_back() {
    init_logger();

    let dir = tempfile::tempdir().unwrap();
    let mut service = MemoryMailService::default();
    let mut sleeper = RecordingSleeper::default();
    let config = MergeConfig {
        subject: "Hello {Nickname}".into(),
        ..config(SendMode::NewMessage)
    };
    let table = Table::from_rows([Row::from_iter([("Email", "a@x.com")])]);
    let mut run = RunDescriptor::new(table, &config);

    let summary = run_pass(&mut service, &mut sleeper, dir.path(), &mut run);

    assert_eq!(1, summary.sent);
    assert_eq!("Hello {Nickname}", service.sent[0].subject);
    // body references {Name}, absent as well
    assert_eq!(2, summary.render_errors.len());
    assert!(summary.render_errors.iter().all(|(addr, _)| addr == "a@x.com"));
    assert_eq!(Status::Sent, run.table.row(0).unwrap().status());
}

#[test]
fn test_enrichment_failures() {
    init_logger();

    let dir = tempfile::tempdir().unwrap();
    let mut service = MemoryMailService::default()
        .headers_unavailable()
        .labels_unavailable();
    let mut sleeper = RecordingSleeper::default();
    let mut run = RunDescriptor::new(
        table(&[("a@x.com", "Al"), ("b@x.com", "Bo")]),
        &config(SendMode::NewMessage),
    );

    let summary = run_pass(&mut service, &mut sleeper, dir.path(), &mut run);

    assert_eq!(2, summary.sent);
    assert!(summary.errors.is_empty());
    assert!(service.labeled.is_empty());
    // label resolution + two unavailable Message-ID
    assert_eq!(3, summary.warnings.len());

    for (index, msg) in service.sent.iter().enumerate() {
        let row = run.table.row(index).unwrap();
        assert_eq!(Status::Sent, row.status());
        assert_eq!(msg.id, row.rfc_message_id());
    }

    // 2 header polls × 2 backoffs + 1 pacing
    assert_eq!(5, sleeper.waits.len());
    assert!(summary.artifact.is_some());
}

#[test]
fn test_backup_failure_keeps_marker() {
    init_logger();

    let dir = tempfile::tempdir().unwrap();
    let mut service = MemoryMailService::default().backup_unavailable();
    let mut sleeper = RecordingSleeper::default();
    let mut run = RunDescriptor::new(table(&[("a@x.com", "Al")]), &config(SendMode::NewMessage));

    let summary = run_pass(&mut service, &mut sleeper, dir.path(), &mut run);

    assert_eq!(1, summary.sent);
    assert_eq!(1, summary.warnings.len());
    assert!(summary.warnings[0].contains("backup"));
    assert_eq!(Status::Sent, run.table.row(0).unwrap().status());

    match Recovery::check(&dir.path().join("done.json"), &dir.path().join("run.json")) {
        Recovery::Completed(marker) => assert_eq!(summary.artifact, Some(marker.file)),
        recovery => panic!("unexpected recovery {:?}", recovery),
    }
}

#[test]
fn test_artifact_failure_skips_marker() {
    init_logger();

    let dir = tempfile::tempdir().unwrap();
    // output dir cannot be created below a regular file
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "").unwrap();

    let mut service = MemoryMailService::default();
    let mut sleeper = RecordingSleeper::default();
    let mut run = RunDescriptor::new(table(&[("a@x.com", "Al")]), &config(SendMode::NewMessage));

    let summary = Dispatcher::new(&mut service)
        .sleeper(&mut sleeper)
        .output_dir(blocker.join("out"))
        .done_marker(dir.path().join("done.json"))
        .run(&mut run)
        .unwrap();

    assert_eq!(1, summary.sent);
    assert_eq!(None, summary.artifact);
    assert_eq!(1, summary.warnings.len());
    assert_eq!(1, service.backups.len());
    assert!(!dir.path().join("done.json").exists());
}
