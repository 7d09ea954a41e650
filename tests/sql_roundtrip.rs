use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_postgres::{Config, NoTls, SimpleQueryMessage};

use courtside::engine::{Engine, EngineOptions};
use courtside::wire;

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server(options: EngineOptions) -> (SocketAddr, Arc<Engine>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let engine = Arc::new(Engine::with_options(options));

    let engine2 = engine.clone();
    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let engine = engine2.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, engine).await;
            });
        }
    });

    (addr, engine)
}

async fn connect(addr: SocketAddr) -> tokio_postgres::Client {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname("courtside")
        .user("courtside");

    let (client, connection) = config.connect(NoTls).await.unwrap();
    tokio::spawn(async move {
        let _ = connection.await;
    });
    client
}

/// Run a simple query and collect the data rows as text columns.
async fn rows(client: &tokio_postgres::Client, sql: &str) -> Vec<Vec<String>> {
    client
        .simple_query(sql)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|msg| match msg {
            SimpleQueryMessage::Row(row) => Some(
                (0..row.len())
                    .map(|i| row.get(i).unwrap_or_default().to_string())
                    .collect(),
            ),
            _ => None,
        })
        .collect()
}

async fn sqlstate(client: &tokio_postgres::Client, sql: &str) -> String {
    let err = client.batch_execute(sql).await.unwrap_err();
    err.code().map(|c| c.code().to_string()).unwrap_or_default()
}

fn book_sql(facility: &str, user: &str, start: &str, end: &str) -> String {
    format!(
        r#"INSERT INTO bookings (facility, "user", start_time, end_time) VALUES ('{facility}', '{user}', '{start}', '{end}')"#
    )
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn facility_lifecycle() {
    let (addr, engine) = start_test_server(EngineOptions::default()).await;
    let client = connect(addr).await;

    client
        .batch_execute("INSERT INTO facilities (name) VALUES ('Court B')")
        .await
        .unwrap();
    client
        .batch_execute("INSERT INTO facilities (name) VALUES ('Court A')")
        .await
        .unwrap();

    let listed = rows(&client, "SELECT * FROM facilities").await;
    let names: Vec<&str> = listed.iter().map(|r| r[0].as_str()).collect();
    assert_eq!(names, vec!["Court B", "Court A"]);
    assert_eq!(listed[0][1].parse::<f64>().unwrap(), 0.0);
    assert_eq!(listed[0][2], "0");

    assert_eq!(
        sqlstate(&client, "INSERT INTO facilities (name) VALUES ('Court A')").await,
        "23505"
    );

    client
        .batch_execute("UPDATE facilities SET hourly_rate = 12.5 WHERE name = 'Court A'")
        .await
        .unwrap();
    let one = rows(&client, "SELECT * FROM facilities WHERE name = 'Court A'").await;
    assert_eq!(one.len(), 1);
    assert_eq!(one[0][1].parse::<f64>().unwrap(), 12.5);

    assert_eq!(
        sqlstate(
            &client,
            "UPDATE facilities SET hourly_rate = -1 WHERE name = 'Court A'"
        )
        .await,
        "22023"
    );

    // The facility is looked up before the rate text is parsed
    assert_eq!(
        sqlstate(
            &client,
            "UPDATE facilities SET hourly_rate = 'abc' WHERE name = 'Nowhere'"
        )
        .await,
        "02000"
    );

    client
        .batch_execute("DELETE FROM facilities WHERE name = 'Court B'")
        .await
        .unwrap();
    assert_eq!(engine.facility_count(), 1);
    assert!(rows(&client, "SELECT * FROM facilities WHERE name = 'Court B'")
        .await
        .is_empty());
    assert_eq!(
        sqlstate(&client, "DELETE FROM facilities WHERE name = 'Court B'").await,
        "02000"
    );
}

#[tokio::test]
async fn booking_flow_over_the_wire() {
    let (addr, _engine) = start_test_server(EngineOptions::default()).await;
    let client = connect(addr).await;

    client
        .batch_execute("INSERT INTO facilities (name) VALUES ('Court A')")
        .await
        .unwrap();
    client
        .batch_execute("UPDATE facilities SET hourly_rate = 20 WHERE name = 'Court A'")
        .await
        .unwrap();

    client
        .batch_execute(&book_sql("Court A", "alice", "2024-06-01 10:00", "2024-06-01 12:30"))
        .await
        .unwrap();

    let booked = rows(&client, "SELECT * FROM bookings WHERE facility = 'Court A'").await;
    assert_eq!(booked.len(), 1);
    assert_eq!(booked[0][0], "Court A");
    assert_eq!(booked[0][1], "alice");
    assert_eq!(booked[0][2], "2024-06-01 10:00");
    assert_eq!(booked[0][3], "2024-06-01 12:30");
    assert_eq!(booked[0][4].parse::<f64>().unwrap(), 50.0);

    // Overlap, bad timestamp, reversed interval
    assert_eq!(
        sqlstate(
            &client,
            &book_sql("Court A", "bob", "2024-06-01 12:00", "2024-06-01 13:00")
        )
        .await,
        "23P01"
    );
    assert_eq!(
        sqlstate(
            &client,
            &book_sql("Court A", "bob", "2024-06-01T12:00", "2024-06-01 13:00")
        )
        .await,
        "22007"
    );
    assert_eq!(
        sqlstate(
            &client,
            &book_sql("Court A", "bob", "2024-06-01 14:00", "2024-06-01 13:00")
        )
        .await,
        "22008"
    );

    // Back-to-back is fine
    client
        .batch_execute(&book_sql("Court A", "bob", "2024-06-01 12:30", "2024-06-01 13:30"))
        .await
        .unwrap();

    client
        .batch_execute(
            r#"UPDATE bookings SET start_time = '2024-06-01 15:00', end_time = '2024-06-01 16:00' WHERE facility = 'Court A' AND "user" = 'alice'"#,
        )
        .await
        .unwrap();
    let moved = rows(&client, "SELECT * FROM bookings WHERE facility = 'Court A'").await;
    let alice = moved.iter().find(|r| r[1] == "alice").unwrap();
    assert_eq!(alice[2], "2024-06-01 15:00");
    assert_eq!(alice[4].parse::<f64>().unwrap(), 20.0);

    client
        .batch_execute(
            r#"DELETE FROM bookings WHERE facility = 'Court A' AND "user" = 'bob' AND start_time = '2024-06-01 12:30'"#,
        )
        .await
        .unwrap();
    assert_eq!(
        sqlstate(
            &client,
            r#"DELETE FROM bookings WHERE facility = 'Court A' AND "user" = 'bob' AND start_time = '2024-06-01 12:30'"#,
        )
        .await,
        "02000"
    );

    let facilities = rows(&client, "SELECT * FROM facilities").await;
    assert_eq!(facilities[0][2], "1");
}

#[tokio::test]
async fn strict_updates_reject_overlapping_move() {
    let options = EngineOptions {
        recheck_overlap_on_update: true,
    };
    let (addr, _engine) = start_test_server(options).await;
    let client = connect(addr).await;

    client
        .batch_execute("INSERT INTO facilities (name) VALUES ('Court A')")
        .await
        .unwrap();
    client
        .batch_execute(&book_sql("Court A", "alice", "2024-06-01 10:00", "2024-06-01 11:00"))
        .await
        .unwrap();
    client
        .batch_execute(&book_sql("Court A", "bob", "2024-06-01 11:00", "2024-06-01 12:00"))
        .await
        .unwrap();

    assert_eq!(
        sqlstate(
            &client,
            r#"UPDATE bookings SET start_time = '2024-06-01 10:30', end_time = '2024-06-01 11:30' WHERE facility = 'Court A' AND "user" = 'alice'"#,
        )
        .await,
        "23P01"
    );
}

#[tokio::test]
async fn extended_protocol_binds_parameters() {
    let (addr, engine) = start_test_server(EngineOptions::default()).await;
    let client = connect(addr).await;

    let inserted = client
        .execute("INSERT INTO facilities (name) VALUES ($1)", &[&"Bob's Court"])
        .await
        .unwrap();
    assert_eq!(inserted, 1);

    client
        .execute(
            r#"INSERT INTO bookings (facility, "user", start_time, end_time) VALUES ($1, $2, $3, $4)"#,
            &[&"Bob's Court", &"carol", &"2024-06-01 09:00", &"2024-06-01 10:00"],
        )
        .await
        .unwrap();

    let bookings = engine.list_bookings("Bob's Court").await.unwrap();
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0].user, "carol");
}

#[tokio::test]
async fn sql_errors_report_syntax_codes() {
    let (addr, _engine) = start_test_server(EngineOptions::default()).await;
    let client = connect(addr).await;

    assert_eq!(sqlstate(&client, "SELEC * FROM facilities").await, "42601");
    assert_eq!(
        sqlstate(&client, "SELECT * FROM courts").await,
        "42P01"
    );
    assert_eq!(
        sqlstate(&client, "SELECT * FROM bookings WHERE facility = 'nowhere'").await,
        "02000"
    );
}

#[tokio::test]
async fn bound_values_containing_placeholders_stay_literal() {
    let (addr, engine) = start_test_server(EngineOptions::default()).await;
    let client = connect(addr).await;

    client
        .batch_execute("INSERT INTO facilities (name) VALUES ('Court A')")
        .await
        .unwrap();
    client
        .execute(
            r#"INSERT INTO bookings (facility, "user", start_time, end_time) VALUES ($1, $2, $3, $4)"#,
            &[&"Court A", &"pay$1", &"2024-06-01 09:00", &"2024-06-01 10:00"],
        )
        .await
        .unwrap();

    let bookings = engine.list_bookings("Court A").await.unwrap();
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0].user, "pay$1");
}
