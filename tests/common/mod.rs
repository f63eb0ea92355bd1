use sqlx::{postgres::PgPoolOptions, Executor, PgPool};

/// A pool whose connections all use a freshly created `schema`, so tests can
/// create and drop the same tables without seeing each other.
///
/// These tests are `#[ignore]`d by default; run them with
/// `cargo test -- --ignored` and `DATABASE_URL` pointing at postgres.
pub async fn isolated_pool(schema: &str) -> PgPool {
    dotenv::dotenv().ok();
    let url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must point at a postgres database to run ignored tests");

    let admin = PgPoolOptions::new()
        .max_connections(1)
        .connect(&url)
        .await
        .expect("connect to DATABASE_URL");
    admin
        .execute(format!("DROP SCHEMA IF EXISTS {} CASCADE", schema).as_str())
        .await
        .expect("drop schema");
    admin
        .execute(format!("CREATE SCHEMA {}", schema).as_str())
        .await
        .expect("create schema");
    admin.close().await;

    let search_path = format!("SET search_path TO {}", schema);
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .after_connect(move |conn, _meta| {
            let search_path = search_path.clone();
            Box::pin(async move {
                conn.execute(search_path.as_str()).await?;
                Ok(())
            })
        })
        .connect(&url)
        .await
        .expect("connect to DATABASE_URL");
    pool
}

pub async fn tables(pool: &PgPool) -> Vec<String> {
    sqlx::query_scalar::<_, String>(
        "SELECT table_name::text FROM information_schema.tables \
         WHERE table_schema = current_schema() ORDER BY 1",
    )
    .fetch_all(pool)
    .await
    .expect("list tables")
}
