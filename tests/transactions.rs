use tenebra::{
    ClassKind, Condition, Context, ContextOptions, PropertyType, Record, Result, Selector,
    TenebraError, TxnMode, TxnState,
};
use tempfile::TempDir;

fn open_db() -> (TempDir, Context) {
    let dir = TempDir::new().unwrap();
    let ctx = Context::open(dir.path(), ContextOptions::default()).unwrap();
    (dir, ctx)
}

fn books_schema(ctx: &Context) {
    let mut txn = ctx.begin(TxnMode::ReadWrite).unwrap();
    txn.create_class("books", ClassKind::Vertex).unwrap();
    txn.add_property("books", "title", PropertyType::Text).unwrap();
    txn.commit().unwrap();
}

#[test]
fn rollback_leaves_no_trace() -> Result<()> {
    let (_dir, ctx) = open_db();
    books_schema(&ctx);

    {
        let mut txn = ctx.begin(TxnMode::ReadWrite)?;
        txn.create_class("persons", ClassKind::Vertex)?;
        txn.create_vertex("books", &Record::new().with("title", "HP"))?;
        txn.create_index("books", "title", false)?;
        txn.rollback()?;
    }

    let txn = ctx.begin(TxnMode::ReadOnly)?;
    assert!(matches!(
        txn.get_class("persons"),
        Err(TenebraError::NoSuchClass(_))
    ));
    assert!(txn.find("books", Selector::All)?.is_empty());
    assert!(matches!(
        txn.get_index("books", "title"),
        Err(TenebraError::NoSuchIndex(_))
    ));
    Ok(())
}

#[test]
fn dropping_an_active_transaction_aborts_it() -> Result<()> {
    let (_dir, ctx) = open_db();
    books_schema(&ctx);

    {
        let mut txn = ctx.begin(TxnMode::ReadWrite)?;
        txn.create_vertex("books", &Record::new().with("title", "HP"))?;
        // dropped without commit
    }

    let txn = ctx.begin(TxnMode::ReadOnly)?;
    assert!(txn.find("books", Selector::All)?.is_empty());
    Ok(())
}

#[test]
fn mutations_require_a_read_write_transaction() -> Result<()> {
    let (_dir, ctx) = open_db();
    books_schema(&ctx);

    let mut txn = ctx.begin(TxnMode::ReadOnly)?;
    assert!(matches!(
        txn.create_class("persons", ClassKind::Vertex),
        Err(TenebraError::TxnInvalidMode)
    ));
    assert!(matches!(
        txn.create_vertex("books", &Record::new()),
        Err(TenebraError::TxnInvalidMode)
    ));
    assert!(matches!(
        txn.create_index("books", "title", false),
        Err(TenebraError::TxnInvalidMode)
    ));
    // reads still work afterwards
    assert!(txn.find("books", Selector::All)?.is_empty());
    Ok(())
}

#[test]
fn readers_keep_their_snapshot() -> Result<()> {
    let (_dir, ctx) = open_db();
    books_schema(&ctx);

    let reader = ctx.begin(TxnMode::ReadOnly)?;

    {
        let mut writer = ctx.begin(TxnMode::ReadWrite)?;
        writer.create_vertex("books", &Record::new().with("title", "HP"))?;
        writer.create_class("persons", ClassKind::Vertex)?;
        writer.commit()?;
    }

    // the reader still sees the world as of its begin
    assert!(reader.find("books", Selector::All)?.is_empty());
    assert!(matches!(
        reader.get_class("persons"),
        Err(TenebraError::NoSuchClass(_))
    ));

    // a transaction begun after the commit sees everything
    let fresh = ctx.begin(TxnMode::ReadOnly)?;
    assert_eq!(fresh.find("books", Selector::All)?.len(), 1);
    assert!(fresh.get_class("persons").is_ok());
    Ok(())
}

#[test]
fn writer_reads_its_own_writes() -> Result<()> {
    let (_dir, ctx) = open_db();
    books_schema(&ctx);

    let mut txn = ctx.begin(TxnMode::ReadWrite)?;
    let rdesc = txn.create_vertex("books", &Record::new().with("title", "HP"))?;
    assert_eq!(txn.find("books", Condition::new("title").eq("HP"))?.len(), 1);
    txn.delete(&rdesc)?;
    assert!(txn.find("books", Selector::All)?.is_empty());
    Ok(())
}

#[test]
fn validation_failures_keep_the_transaction_usable() -> Result<()> {
    let (_dir, ctx) = open_db();
    books_schema(&ctx);

    let mut txn = ctx.begin(TxnMode::ReadWrite)?;
    assert!(matches!(
        txn.create_class("books", ClassKind::Vertex),
        Err(TenebraError::DuplicateClass(_))
    ));
    // the failure did not poison anything
    txn.create_vertex("books", &Record::new().with("title", "HP"))?;
    assert_eq!(txn.state(), TxnState::Active);
    txn.commit()?;

    let txn = ctx.begin(TxnMode::ReadOnly)?;
    assert_eq!(txn.find("books", Selector::All)?.len(), 1);
    Ok(())
}

#[test]
fn commit_makes_changes_durable_across_reopen() -> Result<()> {
    let dir = TempDir::new().unwrap();
    {
        let ctx = Context::open(dir.path(), ContextOptions::default())?;
        books_schema(&ctx);
        let mut txn = ctx.begin(TxnMode::ReadWrite)?;
        txn.create_vertex("books", &Record::new().with("title", "HP"))?;
        txn.create_index("books", "title", false)?;
        txn.commit()?;
    }

    let ctx = Context::open(dir.path(), ContextOptions::default())?;
    let txn = ctx.begin(TxnMode::ReadOnly)?;
    let found = txn.find_index("books", Condition::new("title").eq("HP"))?;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].record.get("title").unwrap().to_text()?, "HP");
    Ok(())
}

#[test]
fn concurrent_readers_are_allowed() -> Result<()> {
    let (_dir, ctx) = open_db();
    books_schema(&ctx);

    let first = ctx.begin(TxnMode::ReadOnly)?;
    let second = ctx.begin(TxnMode::ReadOnly)?;
    assert!(first.find("books", Selector::All)?.is_empty());
    assert!(second.find("books", Selector::All)?.is_empty());
    Ok(())
}
