use tenebra::{
    ClassKind, Context, ContextOptions, PropertyType, Result, TenebraError, TxnMode,
};
use tempfile::TempDir;

fn open_db() -> (TempDir, Context) {
    let dir = TempDir::new().unwrap();
    let ctx = Context::open(dir.path(), ContextOptions::default()).unwrap();
    (dir, ctx)
}

#[test]
fn create_and_get_classes() -> Result<()> {
    let (_dir, ctx) = open_db();
    let mut txn = ctx.begin(TxnMode::ReadWrite)?;

    let books = txn.create_class("books", ClassKind::Vertex)?;
    let authors = txn.create_class("authors", ClassKind::Edge)?;
    assert_ne!(books.id, authors.id);
    assert_eq!(books.kind, ClassKind::Vertex);
    assert_eq!(authors.kind, ClassKind::Edge);
    txn.commit()?;

    let txn = ctx.begin(TxnMode::ReadOnly)?;
    assert_eq!(txn.get_class("books")?.id, books.id);
    assert_eq!(txn.get_class_by_id(authors.id)?.name, "authors");
    assert_eq!(txn.get_classes()?.len(), 2);
    Ok(())
}

#[test]
fn duplicate_and_invalid_class_names_are_rejected() -> Result<()> {
    let (_dir, ctx) = open_db();
    let mut txn = ctx.begin(TxnMode::ReadWrite)?;
    txn.create_class("books", ClassKind::Vertex)?;

    assert!(matches!(
        txn.create_class("books", ClassKind::Vertex),
        Err(TenebraError::DuplicateClass(_))
    ));
    assert!(matches!(
        txn.create_class("", ClassKind::Vertex),
        Err(TenebraError::InvalidClassName(_))
    ));
    assert!(matches!(
        txn.create_class("@internal", ClassKind::Vertex),
        Err(TenebraError::InvalidClassName(_))
    ));
    assert!(matches!(
        txn.create_class(".hidden", ClassKind::Vertex),
        Err(TenebraError::InvalidClassName(_))
    ));
    Ok(())
}

#[test]
fn properties_are_inherited_through_subclasses() -> Result<()> {
    let (_dir, ctx) = open_db();
    let mut txn = ctx.begin(TxnMode::ReadWrite)?;

    txn.create_class("media", ClassKind::Vertex)?;
    txn.add_property("media", "title", PropertyType::Text)?;
    let books = txn.create_subclass("books", "media")?;
    assert_eq!(books.kind, ClassKind::Vertex);
    txn.add_property("books", "pages", PropertyType::Integer)?;

    // visible through the chain
    let title = txn.get_property("books", "title")?;
    assert_eq!(title.class_id, txn.get_class("media")?.id);
    let properties = txn.get_properties("books")?;
    let names: Vec<_> = properties.iter().map(|p| p.name.as_str()).collect();
    assert!(names.contains(&"title"));
    assert!(names.contains(&"pages"));

    // a name visible via inheritance cannot be redeclared, in either
    // direction of the chain
    assert!(matches!(
        txn.add_property("books", "title", PropertyType::Text),
        Err(TenebraError::DuplicateProperty(_))
    ));
    assert!(matches!(
        txn.add_property("media", "pages", PropertyType::Integer),
        Err(TenebraError::DuplicateProperty(_))
    ));
    Ok(())
}

#[test]
fn rename_preserves_ids() -> Result<()> {
    let (_dir, ctx) = open_db();
    let mut txn = ctx.begin(TxnMode::ReadWrite)?;

    let books = txn.create_class("books", ClassKind::Vertex)?;
    let title = txn.add_property("books", "title", PropertyType::Text)?;

    txn.rename_class("books", "publications")?;
    assert_eq!(txn.get_class("publications")?.id, books.id);
    assert!(matches!(
        txn.get_class("books"),
        Err(TenebraError::NoSuchClass(_))
    ));

    txn.rename_property("publications", "title", "headline")?;
    assert_eq!(txn.get_property("publications", "headline")?.id, title.id);
    assert!(matches!(
        txn.get_property("publications", "title"),
        Err(TenebraError::NoSuchProperty(_))
    ));
    Ok(())
}

#[test]
fn drop_property_refused_while_indexed() -> Result<()> {
    let (_dir, ctx) = open_db();
    let mut txn = ctx.begin(TxnMode::ReadWrite)?;

    txn.create_class("books", ClassKind::Vertex)?;
    txn.add_property("books", "title", PropertyType::Text)?;
    txn.create_index("books", "title", false)?;

    assert!(matches!(
        txn.drop_property("books", "title"),
        Err(TenebraError::PropertyInUse(_))
    ));

    txn.drop_index("books", "title")?;
    txn.drop_property("books", "title")?;
    assert!(matches!(
        txn.get_property("books", "title"),
        Err(TenebraError::NoSuchProperty(_))
    ));
    Ok(())
}

#[test]
fn drop_class_refused_while_subclasses_exist() -> Result<()> {
    let (_dir, ctx) = open_db();
    let mut txn = ctx.begin(TxnMode::ReadWrite)?;

    txn.create_class("media", ClassKind::Vertex)?;
    txn.create_subclass("books", "media")?;

    assert!(matches!(
        txn.drop_class("media"),
        Err(TenebraError::ClassInUse(_))
    ));

    txn.drop_class("books")?;
    txn.drop_class("media")?;
    assert!(txn.get_classes()?.is_empty());
    Ok(())
}

#[test]
fn catalog_survives_reopen_and_class_ids_stay_monotonic() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let first_id;
    let second_id;
    {
        let ctx = Context::open(dir.path(), ContextOptions::default())?;
        let mut txn = ctx.begin(TxnMode::ReadWrite)?;
        first_id = txn.create_class("books", ClassKind::Vertex)?.id;
        txn.add_property("books", "title", PropertyType::Text)?;
        second_id = txn.create_class("persons", ClassKind::Vertex)?.id;
        txn.drop_class("persons")?;
        txn.commit()?;
    }

    let ctx = Context::open(dir.path(), ContextOptions::default())?;
    let mut txn = ctx.begin(TxnMode::ReadWrite)?;
    assert_eq!(txn.get_class("books")?.id, first_id);
    assert_eq!(txn.get_property("books", "title")?.prop_type, PropertyType::Text);

    // the dropped class's id is not reused after reopen
    let third_id = txn.create_class("reviews", ClassKind::Vertex)?.id;
    assert!(third_id.0 > second_id.0);
    Ok(())
}

#[test]
fn db_info_reports_catalog_counts() -> Result<()> {
    let (_dir, ctx) = open_db();
    let mut txn = ctx.begin(TxnMode::ReadWrite)?;
    txn.create_class("books", ClassKind::Vertex)?;
    txn.add_property("books", "title", PropertyType::Text)?;
    txn.add_property("books", "pages", PropertyType::Integer)?;
    txn.create_index("books", "title", false)?;

    let info = txn.db_info();
    assert_eq!(info.num_classes, 1);
    assert_eq!(info.num_properties, 2);
    assert_eq!(info.num_indexes, 1);
    assert_eq!(info.max_databases, 1024);
    Ok(())
}
