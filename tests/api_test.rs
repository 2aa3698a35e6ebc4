use deftree::schema::{ClassSchema, MemberSchema};
use deftree::{load, Database, LoadConfig};
use indoc::indoc;

fn shop_database() -> Database {
    let db = Database::new();
    let types = db.types();
    let item = types
        .register_class(
            ClassSchema::definition("Item")
                .field("Price", "int")
                .field("Ratio", "double")
                .field("Tags", "List<string>"),
        )
        .unwrap();
    types
        .register_class(
            ClassSchema::definition("Shop")
                .field("Stock", "Dictionary<string, int>")
                .field("Featured", item)
                .member(MemberSchema::property("Owner", "string").include()),
        )
        .unwrap();
    db
}

#[test]
fn test_simple_load_to_json() {
    let mut db = shop_database();
    let report = load(
        &mut db,
        &[(
            "shop.xml",
            indoc! {r#"
                <Defs>
                    <Apple Type="Item">
                        <Price>3</Price>
                        <Ratio>0.5</Ratio>
                        <Tags><li>fruit</li><li>red</li></Tags>
                    </Apple>
                    <Grocer Type="Shop">
                        <Stock><Apple>12</Apple><Pear>0</Pear></Stock>
                        <Featured>Apple</Featured>
                        <Owner>Ann</Owner>
                    </Grocer>
                </Defs>
            "#},
        )],
        LoadConfig::default(),
    )
    .unwrap();
    assert!(!report.has_errors(), "{:?}", report.diagnostics);

    let expected_json = serde_json::json!({
        "Apple": {
            "$type": "Item",
            "Price": 3,
            "Ratio": 0.5,
            "Tags": ["fruit", "red"],
        },
        "Grocer": {
            "$type": "Shop",
            "Stock": { "Apple": 12, "Pear": 0 },
            "Featured": "Apple",
            "Owner": "Ann",
        }
    });

    let result_json: serde_json::Value = serde_json::from_str(&db.to_json().unwrap()).unwrap();
    assert_eq!(result_json, expected_json);
}

#[test]
fn test_report_serializes() {
    let mut db = shop_database();
    let report = load(
        &mut db,
        &[("shop.xml", r#"<Defs><Apple Type="Item"><Price>cheap</Price></Apple></Defs>"#)],
        LoadConfig::default(),
    )
    .unwrap();

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["loaded"], 1);
    assert_eq!(json["diagnostics"][0]["severity"], "Error");
    assert_eq!(json["diagnostics"][0]["definition"], "Apple");
    assert_eq!(json["diagnostics"][0]["path"], "Apple/Price");
}

#[test]
fn test_reports_are_per_load() {
    let mut db = shop_database();
    let first = load(
        &mut db,
        &[("a.xml", r#"<Defs><A Type="Item"><Nope/></A></Defs>"#)],
        LoadConfig::default(),
    )
    .unwrap();
    let second = load(
        &mut db,
        &[("b.xml", r#"<Defs><B Type="Item"/></Defs>"#)],
        LoadConfig::default(),
    )
    .unwrap();

    assert_eq!(first.errors().count(), 1);
    assert!(second.diagnostics.is_empty());
    assert_eq!(db.diagnostics().error_count(), 1);
    assert_eq!(db.count(), 2);
}

#[test]
fn test_listeners_receive_diagnostics() {
    use std::cell::RefCell;
    use std::rc::Rc;

    let mut db = shop_database();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    db.diagnostics()
        .on_error(move |d| sink.borrow_mut().push(d.to_string()));

    load(
        &mut db,
        &[("a.xml", r#"<Defs><A Type="Item"><Price>x</Price></A></Defs>"#)],
        LoadConfig::default(),
    )
    .unwrap();

    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].starts_with("[A] "));
    assert!(seen[0].contains("(at A/Price)"));
}
