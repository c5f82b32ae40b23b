//! Reads a typed CSV stream asynchronously.
//!
//! ```text
//! RUST_LOG=csvmodem=debug cargo run --example people
//! ```

use csvmodem::{
    AsyncReader, AsyncUtf8Source, ConfigError, Describe, MemberOptions, ReaderOptions, Record, RowConstructor,
    Schema, SchemaBuilder,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const PEOPLE: &str = "\
# exported 2026-10-01
email,name,age
ada@example.org,Ada Lovelace,36
grace@example.org,\"Hopper, Grace\",85
nobody@example.org,Nobody,unknown
,Anonymous,40
";

#[derive(Debug, Default)]
struct Person {
    name: String,
    email: String,
    age: Option<u8>,
}

impl Describe for Person {
    fn schema() -> Result<Schema<Self>, ConfigError> {
        let required = MemberOptions {
            required: true,
            ..Default::default()
        };
        SchemaBuilder::with_default()
            .parsed("name", |p: &mut Person, v| p.name = v, required)
            .delegate(
                "email",
                |p: &mut Person, text: &str| {
                    if text.is_empty() {
                        return Err(csvmodem::CellError::new("empty address"));
                    }
                    p.email = text.to_owned();
                    Ok(())
                },
                required,
            )
            .parsed("age", |p: &mut Person, v: u8| p.age = Some(v), MemberOptions::default())
            .build()
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let options = ReaderOptions {
        comment: Some('#'),
        ..Default::default()
    };
    let cancel = CancellationToken::new();
    let source = AsyncUtf8Source::new(PEOPLE.as_bytes());
    let mut reader = AsyncReader::<_, RowConstructor<Person>>::new(source, &options)?;

    loop {
        match reader.next_record(&cancel).await {
            Ok(Some(Record::Row(person))) => info!(?person, "read"),
            Ok(Some(Record::Comment(text))) => info!(comment = text.trim(), "comment"),
            Ok(None) => break,
            Err(err) if err.is_row_scoped() => warn!(%err, "skipped row"),
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}
