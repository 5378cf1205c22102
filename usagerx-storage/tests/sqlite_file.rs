use std::sync::Arc;
use std::thread;
use std::time::Duration;

use usagerx_protocols::{ColumnSpec, PersistenceCommand, SqlType};
use usagerx_storage::{PersistenceSink, SqliteSink};

const COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("hostname", SqlType::Text),
    ColumnSpec::new("seq", SqlType::Integer),
];

#[test]
fn rows_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("usage.db");

    {
        let sink = SqliteSink::open(&path, Duration::from_secs(1)).unwrap();
        sink.provision("events", COLUMNS).unwrap();
        for seq in 0..5i64 {
            sink.write(
                &PersistenceCommand::insert_into("events")
                    .bind("hostname", "node")
                    .bind("seq", seq),
            )
            .unwrap();
        }
    }

    let sink = SqliteSink::open(&path, Duration::from_secs(1)).unwrap();
    assert_eq!(sink.count_rows("events").unwrap(), 5);
    assert_eq!(sink.path(), path.as_path());
}

#[test]
fn concurrent_writers_share_one_connection() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(SqliteSink::open(dir.path().join("usage.db"), Duration::from_secs(1)).unwrap());
    sink.provision("events", COLUMNS).unwrap();

    let writers: Vec<_> = (0..4i64)
        .map(|w| {
            let sink = Arc::clone(&sink);
            thread::spawn(move || {
                for i in 0..50i64 {
                    sink.write(
                        &PersistenceCommand::insert_into("events")
                            .bind("hostname", format!("writer-{w}"))
                            .bind("seq", i),
                    )
                    .unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    assert_eq!(sink.count_rows("events").unwrap(), 200);
}
