use tenebra::{
    Bytes, ClassKind, Condition, Context, ContextOptions, PropertyType, Record, Result,
    ResultCursor, Selector, TenebraError, TxnMode,
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
    txn.add_property("books", "pages", PropertyType::Integer).unwrap();
    txn.add_property("books", "price", PropertyType::Real).unwrap();
    txn.commit().unwrap();
}

#[test]
fn create_and_read_a_vertex() -> Result<()> {
    let (_dir, ctx) = open_db();
    books_schema(&ctx);

    let mut txn = ctx.begin(TxnMode::ReadWrite)?;
    let record = Record::new()
        .with("title", "Harry Potter")
        .with("pages", 456i32)
        .with("price", 24.5f64);
    let rdesc = txn.create_vertex("books", &record)?;

    let fetched = txn.fetch_record(&rdesc)?;
    assert_eq!(fetched.get("title").unwrap().to_text()?, "Harry Potter");
    assert_eq!(fetched.get("pages").unwrap().to_i32()?, 456);
    assert_eq!(fetched.get("price").unwrap().to_f64()?, 24.5);
    assert_eq!(fetched.class_name().as_deref(), Some("books"));
    assert_eq!(fetched.record_id().unwrap(), rdesc.rid.to_string());
    txn.commit()?;
    Ok(())
}

#[test]
fn positions_start_at_one() -> Result<()> {
    let (_dir, ctx) = open_db();
    books_schema(&ctx);

    let mut txn = ctx.begin(TxnMode::ReadWrite)?;
    let first = txn.create_vertex("books", &Record::new().with("title", "a"))?;
    let second = txn.create_vertex("books", &Record::new().with("title", "b"))?;
    assert_eq!(first.rid.position.0, 1);
    assert_eq!(second.rid.position.0, 2);
    Ok(())
}

#[test]
fn update_merges_supplied_properties() -> Result<()> {
    let (_dir, ctx) = open_db();
    books_schema(&ctx);

    let mut txn = ctx.begin(TxnMode::ReadWrite)?;
    let rdesc = txn.create_vertex(
        "books",
        &Record::new().with("title", "HP").with("pages", 456i32),
    )?;

    txn.update(&rdesc, &Record::new().with("pages", 500i32))?;
    let fetched = txn.fetch_record(&rdesc)?;
    assert_eq!(fetched.get("title").unwrap().to_text()?, "HP");
    assert_eq!(fetched.get("pages").unwrap().to_i32()?, 500);

    // an explicit null overwrites, an unmentioned property survives
    txn.update(&rdesc, &Record::new().with("title", Bytes::empty()))?;
    let fetched = txn.fetch_record(&rdesc)?;
    assert!(fetched.get("title").unwrap().is_null());
    assert_eq!(fetched.get("pages").unwrap().to_i32()?, 500);
    Ok(())
}

#[test]
fn update_of_missing_record_fails() -> Result<()> {
    let (_dir, ctx) = open_db();
    books_schema(&ctx);

    let mut txn = ctx.begin(TxnMode::ReadWrite)?;
    let rdesc = txn.create_vertex("books", &Record::new().with("title", "HP"))?;
    txn.delete(&rdesc)?;
    assert!(matches!(
        txn.update(&rdesc, &Record::new().with("pages", 1i32)),
        Err(TenebraError::NoSuchRecord(_))
    ));
    Ok(())
}

#[test]
fn destroyed_record_reads_back_empty() -> Result<()> {
    let (_dir, ctx) = open_db();
    books_schema(&ctx);

    let mut txn = ctx.begin(TxnMode::ReadWrite)?;
    let rdesc = txn.create_vertex("books", &Record::new().with("title", "HP"))?;
    txn.delete(&rdesc)?;
    assert!(txn.fetch_record(&rdesc)?.is_empty());
    Ok(())
}

#[test]
fn unknown_property_is_rejected() -> Result<()> {
    let (_dir, ctx) = open_db();
    books_schema(&ctx);

    let mut txn = ctx.begin(TxnMode::ReadWrite)?;
    assert!(matches!(
        txn.create_vertex("books", &Record::new().with("isbn", "x")),
        Err(TenebraError::NoSuchProperty(_))
    ));
    Ok(())
}

#[test]
fn vertex_create_on_edge_class_is_rejected() -> Result<()> {
    let (_dir, ctx) = open_db();
    let mut txn = ctx.begin(TxnMode::ReadWrite)?;
    txn.create_class("knows", ClassKind::Edge)?;
    assert!(matches!(
        txn.create_vertex("knows", &Record::new()),
        Err(TenebraError::MismatchClassKind(_))
    ));
    Ok(())
}

#[test]
fn find_all_skips_the_reserved_position() -> Result<()> {
    let (_dir, ctx) = open_db();
    books_schema(&ctx);

    let mut txn = ctx.begin(TxnMode::ReadWrite)?;
    for i in 0..5 {
        txn.create_vertex("books", &Record::new().with("pages", i as i32))?;
    }
    let all = txn.find("books", Selector::All)?;
    assert_eq!(all.len(), 5);
    assert!(all.iter().all(|r| r.descriptor.rid.position.0 >= 1));
    Ok(())
}

#[test]
fn truncate_clears_class_and_subclasses() -> Result<()> {
    let (_dir, ctx) = open_db();
    let mut txn = ctx.begin(TxnMode::ReadWrite)?;
    txn.create_class("media", ClassKind::Vertex)?;
    txn.add_property("media", "title", PropertyType::Text)?;
    txn.create_subclass("books", "media")?;

    txn.create_vertex("media", &Record::new().with("title", "m"))?;
    txn.create_vertex("books", &Record::new().with("title", "b"))?;
    assert_eq!(txn.find_extend("media", Selector::All)?.len(), 2);

    txn.truncate("media")?;
    assert!(txn.find_extend("media", Selector::All)?.is_empty());
    Ok(())
}

#[test]
fn subclass_records_answer_extended_queries() -> Result<()> {
    let (_dir, ctx) = open_db();
    let mut txn = ctx.begin(TxnMode::ReadWrite)?;
    txn.create_class("media", ClassKind::Vertex)?;
    txn.add_property("media", "title", PropertyType::Text)?;
    txn.create_subclass("books", "media")?;

    txn.create_vertex("media", &Record::new().with("title", "HP"))?;
    txn.create_vertex("books", &Record::new().with("title", "HP"))?;

    let narrow = txn.find("media", Condition::new("title").eq("HP"))?;
    assert_eq!(narrow.len(), 1);
    let wide = txn.find_extend("media", Condition::new("title").eq("HP"))?;
    assert_eq!(wide.len(), 2);
    Ok(())
}

#[test]
fn cursor_pages_through_results() -> Result<()> {
    let (_dir, ctx) = open_db();
    books_schema(&ctx);

    let mut txn = ctx.begin(TxnMode::ReadWrite)?;
    for i in 0..10 {
        txn.create_vertex("books", &Record::new().with("pages", i as i32))?;
    }

    let mut cursor = txn.find_cursor("books", Selector::All)?;
    assert_eq!(ResultCursor::count(&cursor), 10);

    let first = cursor.next().unwrap()?;
    assert_eq!(first.record.get("pages").unwrap().to_i32()?, 0);
    let third = cursor.to(2).unwrap()?;
    assert_eq!(third.record.get("pages").unwrap().to_i32()?, 2);
    let second = cursor.previous().unwrap()?;
    assert_eq!(second.record.get("pages").unwrap().to_i32()?, 1);
    let last = ResultCursor::last(&mut cursor).unwrap()?;
    assert_eq!(last.record.get("pages").unwrap().to_i32()?, 9);
    assert!(cursor.next().is_none());

    let remaining: Vec<_> = txn.find_cursor("books", Selector::All)?.collect();
    assert_eq!(remaining.len(), 10);
    Ok(())
}
