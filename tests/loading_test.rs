use deftree::converter::{CsvConverter, SimpleConverter};
use deftree::diagnostics::Severity;
use deftree::error::{ConvertError, HookError, SessionError};
use deftree::schema::{ClassSchema, EnumSchema, InterfaceSchema, MemberSchema};
use deftree::value::{CustomValue, Object, ObjectRef, Value};
use deftree::{load, Database, LoadConfig};
use indoc::indoc;
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn test_duplicate_ids_keep_the_first() {
    let mut db = Database::new();
    db.types()
        .register_class(ClassSchema::definition("Widget").field("Name", "string"))
        .unwrap();

    let report = load(
        &mut db,
        &[
            ("a.xml", r#"<Defs><Foo Type="Widget"><Name>first</Name></Foo></Defs>"#),
            ("b.xml", r#"<Defs><Foo Type="Widget"><Name>second</Name></Foo></Defs>"#),
        ],
        LoadConfig::default(),
    )
    .unwrap();

    assert_eq!(report.errors().count(), 1);
    assert_eq!(report.loaded, 1);
    assert_eq!(db.count(), 1);
    assert_eq!(db.get("Foo").unwrap().borrow().get_str("Name"), Some("first"));
}

#[test]
fn test_bad_list_item_does_not_stop_siblings() {
    let mut db = Database::new();
    db.types()
        .register_class(ClassSchema::definition("Knob").field("Values", "List<int>"))
        .unwrap();

    let report = load(
        &mut db,
        &[(
            "knobs.xml",
            indoc! {r#"
                <Defs>
                    <Knob Type="Knob">
                        <Values>
                            <li>1</li>
                            <li>oops</li>
                            <li>3</li>
                        </Values>
                    </Knob>
                </Defs>
            "#},
        )],
        LoadConfig::default(),
    )
    .unwrap();

    assert_eq!(report.errors().count(), 1);
    let error = report.errors().next().unwrap();
    assert_eq!(error.path.as_deref(), Some("Knob/Values/li[2]"));
    assert_eq!(error.definition.as_deref(), Some("Knob"));

    let knob = db.get("Knob").unwrap().borrow();
    let values: Vec<i64> = knob
        .get_list("Values")
        .unwrap()
        .iter()
        .filter_map(Value::as_i64)
        .collect();
    assert_eq!(values, vec![1, 3]);
}

#[test]
fn test_list_item_naming_and_sets() {
    let mut db = Database::new();
    db.types()
        .register_class(
            ClassSchema::definition("Bag")
                .field("Named", "List<string>")
                .field("Unique", "HashSet<int>"),
        )
        .unwrap();

    let report = load(
        &mut db,
        &[(
            "bags.xml",
            indoc! {r#"
                <Defs>
                    <Bag Type="Bag">
                        <Named><item>a</item><item>b</item></Named>
                        <Unique><li>1</li><li>2</li><li>1</li></Unique>
                    </Bag>
                </Defs>
            "#},
        )],
        LoadConfig::default(),
    )
    .unwrap();

    assert!(!report.has_errors());
    assert_eq!(report.warnings().count(), 2);
    let bag = db.get("Bag").unwrap().borrow();
    assert_eq!(bag.get_list("Named").unwrap().len(), 2);
    assert_eq!(bag.get_list("Unique").unwrap().len(), 2);
}

#[test]
fn test_maps_enums_and_references() {
    let mut db = Database::new();
    let types = db.types();
    types
        .register_enum(
            EnumSchema::new("Slot")
                .variant("Head")
                .variant("Hands")
                .variant_value("Feet", 10),
        )
        .unwrap();
    types
        .register_class(
            ClassSchema::definition("Armor")
                .field("Slot", "Slot")
                .field("Prices", "Dictionary<string, int>")
                .field("Weights", "Dictionary<Slot, float>")
                .field("Upgrade", "Armor"),
        )
        .unwrap();

    let report = load(
        &mut db,
        &[(
            "armor.xml",
            indoc! {r#"
                <Defs>
                    <Helmet Type="Armor">
                        <Slot>head</Slot>
                        <Prices><gold>3</gold><silver>9</silver><gold>5</gold></Prices>
                        <Upgrade>BetterHelmet</Upgrade>
                    </Helmet>
                    <BetterHelmet Type="Armor">
                        <Slot>10</Slot>
                        <Weights><Head>1.5</Head><Feet>2</Feet></Weights>
                        <Upgrade>BetterHelmet</Upgrade>
                    </BetterHelmet>
                </Defs>
            "#},
        )],
        LoadConfig::default(),
    )
    .unwrap();

    assert!(!report.has_errors(), "{:?}", report.diagnostics);
    assert_eq!(report.warnings().count(), 1);
    assert!(report.warnings().next().unwrap().message.contains("gold"));

    let helmet = db.get("Helmet").unwrap();
    let better = db.get("BetterHelmet").unwrap();
    {
        let helmet = helmet.borrow();
        assert_eq!(helmet.get("Slot").unwrap().as_enum().unwrap().name, "Head");
        let prices = helmet.get_map("Prices").unwrap();
        let keys: Vec<&str> = prices.iter().map(|(k, _)| k.as_str().unwrap()).collect();
        assert_eq!(keys, vec!["gold", "silver"]);
        assert_eq!(prices.get_str("gold").and_then(Value::as_i64), Some(5));
        assert!(Rc::ptr_eq(&helmet.get_object("Upgrade").unwrap(), better.object_ref()));
    }

    let better = better.borrow();
    assert_eq!(better.get("Slot").unwrap().as_enum().unwrap().name, "Feet");
    assert_eq!(better.get_map("Weights").unwrap().len(), 2);
    let upgrade = better.get_object("Upgrade").unwrap();
    assert!(Rc::ptr_eq(&upgrade, db.get("BetterHelmet").unwrap().object_ref()));
}

#[test]
fn test_unknown_reference_and_member() {
    let mut db = Database::new();
    db.types()
        .register_class(ClassSchema::definition("Door").field("Key", "Door").field("Open", "bool"))
        .unwrap();

    let report = load(
        &mut db,
        &[(
            "doors.xml",
            r#"<Defs>
                <Gate Type="Door"><Key>Missing</Key><Colour>red</Colour><Open>TRUE</Open></Gate>
            </Defs>"#,
        )],
        LoadConfig::default(),
    )
    .unwrap();

    assert_eq!(report.errors().count(), 2);
    let gate = db.get("Gate").unwrap().borrow();
    assert_eq!(gate.get("Key"), Some(&Value::Null));
    assert_eq!(gate.get_bool("Open"), Some(true));
}

#[test]
fn test_lifecycle_runs_in_phase_order() {
    let log = Rc::new(RefCell::new(Vec::<String>::new()));
    let entry = |phase: &'static str| {
        let log = Rc::clone(&log);
        move |object: &ObjectRef| -> Result<(), HookError> {
            let id = object.borrow().id().unwrap_or("?").to_string();
            log.borrow_mut().push(format!("{} {}", phase, id));
            Ok(())
        }
    };
    let validate_log = Rc::clone(&log);

    let mut db = Database::new();
    db.types()
        .register_class(
            ClassSchema::definition("Machine")
                .field("Power", "int")
                .on_constructed(entry("constructed"))
                .on_post_load(entry("post"))
                .on_late_post_load(entry("late"))
                .on_validate(move |object, _| {
                    validate_log
                        .borrow_mut()
                        .push(format!("validate {}", object.id().unwrap_or("?")));
                    Ok(())
                }),
        )
        .unwrap();

    let report = load(
        &mut db,
        &[(
            "machines.xml",
            r#"<Defs><M1 Type="Machine"><Power>1</Power></M1><M2 Type="Machine"/></Defs>"#,
        )],
        LoadConfig::default(),
    )
    .unwrap();

    assert!(!report.has_errors());
    assert_eq!(
        *log.borrow(),
        vec![
            "constructed M1",
            "constructed M2",
            "post M1",
            "post M2",
            "late M1",
            "late M2",
            "validate M1",
            "validate M2",
        ]
    );
}

#[test]
fn test_lifecycle_phases_can_be_disabled() {
    let calls = Rc::new(RefCell::new(0usize));
    let counter = Rc::clone(&calls);

    let mut db = Database::new();
    db.types()
        .register_class(ClassSchema::definition("Machine").on_post_load(move |_| {
            *counter.borrow_mut() += 1;
            Ok(())
        }))
        .unwrap();

    let config = LoadConfig {
        do_post_load: false,
        ..LoadConfig::default()
    };
    load(&mut db, &[("m.xml", r#"<Defs><M Type="Machine"/></Defs>"#)], config).unwrap();
    assert_eq!(*calls.borrow(), 0);
}

#[test]
fn test_failing_hook_is_isolated() {
    let mut db = Database::new();
    db.types()
        .register_class(
            ClassSchema::definition("Fragile")
                .field("Fail", "bool")
                .field("Loaded", "bool")
                .on_post_load(|object| {
                    let fail = object.borrow().get_bool("Fail") == Some(true);
                    if fail {
                        return Err(HookError::new("refusing to load"));
                    }
                    object.borrow_mut().set("Loaded", Value::Bool(true));
                    Ok(())
                }),
        )
        .unwrap();

    let report = load(
        &mut db,
        &[(
            "fragile.xml",
            r#"<Defs>
                <Broken Type="Fragile"><Fail>true</Fail></Broken>
                <Sturdy Type="Fragile"/>
            </Defs>"#,
        )],
        LoadConfig::default(),
    )
    .unwrap();

    assert_eq!(report.errors().count(), 1);
    let error = report.errors().next().unwrap();
    assert_eq!(error.definition.as_deref(), Some("Broken"));
    assert!(error.cause.as_deref().unwrap_or_default().contains("refusing to load"));
    assert_eq!(db.get("Sturdy").unwrap().borrow().get_bool("Loaded"), Some(true));
    assert_eq!(db.count(), 2);
}

#[test]
fn test_hooks_can_follow_reference_cycles() {
    let mut db = Database::new();
    db.types()
        .register_class(
            ClassSchema::definition("Link")
                .field("Next", "Link")
                .field("Back", "string")
                .on_post_load(|link| {
                    let next = link.borrow().get_object("Next");
                    let mut back_id = String::new();
                    if let Some(next) = next {
                        let back = next.borrow().get_object("Next");
                        if let Some(back) = back {
                            back_id = back.borrow().id().unwrap_or_default().to_string();
                        }
                    }
                    link.borrow_mut().set("Back", Value::from(back_id));
                    Ok(())
                }),
        )
        .unwrap();

    let report = load(
        &mut db,
        &[(
            "links.xml",
            indoc! {r#"
                <Defs>
                    <A Type="Link"><Next>B</Next></A>
                    <B Type="Link"><Next>A</Next></B>
                    <Solo Type="Link"/>
                </Defs>
            "#},
        )],
        LoadConfig::default(),
    )
    .unwrap();

    assert!(!report.has_errors(), "{:?}", report.diagnostics);
    assert_eq!(db.get("A").unwrap().borrow().get_str("Back"), Some("A"));
    assert_eq!(db.get("B").unwrap().borrow().get_str("Back"), Some("B"));
    assert_eq!(db.get("Solo").unwrap().borrow().get_str("Back"), Some(""));
}

#[test]
fn test_converter_objects_take_part_in_lifecycle() {
    let constructed = Rc::new(RefCell::new(0usize));
    let posted = Rc::new(RefCell::new(0usize));
    let (on_constructed, on_posted) = (Rc::clone(&constructed), Rc::clone(&posted));

    let mut db = Database::new();
    let color = db
        .types()
        .register_class(
            ClassSchema::new("Color")
                .field("Name", "string")
                .on_constructed(move |_| {
                    *on_constructed.borrow_mut() += 1;
                    Ok(())
                })
                .on_post_load(move |_| {
                    *on_posted.borrow_mut() += 1;
                    Ok(())
                })
                .on_validate(|color, reporter| {
                    reporter.assert(color.get_str("Name") != Some("mauve"), "mauve is not a color");
                    Ok(())
                }),
        )
        .unwrap();
    db.types()
        .register_class(
            ClassSchema::definition("Lamp")
                .field("Tint", color)
                .field("Glow", color),
        )
        .unwrap();

    db.start_loading(LoadConfig::default(), false).unwrap();
    db.session_mut()
        .unwrap()
        .add_converter(Rc::new(SimpleConverter::new("Color", color, move |text| {
            let mut object = Object::new(color);
            object.set("Name", Value::from(text.trim()));
            Ok(Value::Object(object.into_ref()))
        })));
    db.add_document_str(
        r#"<Defs><L Type="Lamp"><Tint>red</Tint><Glow>mauve</Glow></L></Defs>"#,
        "lamps.xml",
    )
    .unwrap();
    assert_eq!(db.finish_loading(), Ok(1));

    assert_eq!(*constructed.borrow(), 2);
    assert_eq!(*posted.borrow(), 2);
    let errors = db.diagnostics().errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].definition.as_deref(), Some("L"));
}

#[test]
fn test_validation_is_attributed_to_the_definition() {
    let mut db = Database::new();
    db.types()
        .register_class(
            ClassSchema::definition("Gear")
                .field("Teeth", "int")
                .on_validate(|object, reporter| {
                    let teeth = object.get_i64("Teeth").unwrap_or(0);
                    reporter.assert(teeth > 0, "a gear needs teeth");
                    if teeth > 100 {
                        reporter.warn("that is a lot of teeth");
                    }
                    Ok(())
                }),
        )
        .unwrap();

    let report = load(
        &mut db,
        &[(
            "gears.xml",
            indoc! {r#"
                <Defs>
                    <Small Type="Gear"><Teeth>8</Teeth></Small>
                    <Bald Type="Gear"/>
                    <Huge Type="Gear"><Teeth>400</Teeth></Huge>
                </Defs>
            "#},
        )],
        LoadConfig::default(),
    )
    .unwrap();

    let errors: Vec<_> = report.errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].definition.as_deref(), Some("Bald"));
    assert!(errors[0].message.contains("a gear needs teeth"));

    let warnings: Vec<_> = report.warnings().collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].severity, Severity::Warning);
    assert_eq!(warnings[0].definition.as_deref(), Some("Huge"));
    assert_eq!(db.count(), 3);
}

#[test]
fn test_reload_patches_in_place() {
    let mut db = Database::new();
    db.types()
        .register_class(
            ClassSchema::definition("Widget")
                .field("Name", "string")
                .field("Size", "int"),
        )
        .unwrap();

    load(
        &mut db,
        &[("v1.xml", r#"<Defs><A Type="Widget"><Name>one</Name><Size>1</Size></A></Defs>"#)],
        LoadConfig::default(),
    )
    .unwrap();
    let original = db.get("A").unwrap().object();

    db.start_loading(LoadConfig::default(), true).unwrap();
    assert!(db
        .add_document_str(
            r#"<Defs><A Type="Widget"><Name>two</Name></A><B Type="Widget"/></Defs>"#,
            "v2.xml",
        )
        .unwrap());
    assert_eq!(db.finish_loading(), Ok(1));

    assert!(!db.diagnostics().has_errors());
    assert_eq!(db.count(), 2);
    let patched = db.get("A").unwrap();
    assert!(Rc::ptr_eq(&original, patched.object_ref()));
    assert_eq!(patched.borrow().get_str("Name"), Some("two"));
    assert_eq!(patched.borrow().get_i64("Size"), Some(1));
}

#[test]
fn test_existing_id_without_reload_is_an_error() {
    let mut db = Database::new();
    db.types()
        .register_class(ClassSchema::definition("Widget").field("Name", "string"))
        .unwrap();

    let source = [("a.xml", r#"<Defs><A Type="Widget"><Name>one</Name></A></Defs>"#)];
    load(&mut db, &source, LoadConfig::default()).unwrap();
    let report = load(&mut db, &source, LoadConfig::default()).unwrap();

    assert_eq!(report.loaded, 0);
    assert_eq!(report.errors().count(), 1);
    assert_eq!(db.count(), 1);
}

#[test]
fn test_static_members() {
    let mut db = Database::new();
    let settings = db
        .types()
        .register_class(
            ClassSchema::definition("Settings")
                .member(MemberSchema::field("Volume", "int").statik())
                .field("Label", "string"),
        )
        .unwrap();

    let source = [(
        "settings.xml",
        r#"<Defs><Audio Type="Settings"><Volume>7</Volume><Label>audio</Label></Audio></Defs>"#,
    )];

    let report = load(&mut db, &source, LoadConfig::default()).unwrap();
    assert_eq!(report.errors().count(), 1);
    assert!(db.types_with_static_data().is_empty());

    db.clear();
    let mut config = LoadConfig::default();
    config.member_access.statics = true;
    let report = load(&mut db, &source, config).unwrap();
    assert!(!report.has_errors(), "{:?}", report.diagnostics);
    assert_eq!(db.static_value(settings, "Volume"), Some(Value::Int(7)));
    assert_eq!(db.types_with_static_data(), vec![settings]);
    assert!(db.get("Audio").unwrap().borrow().get("Volume").is_none());
}

#[derive(Debug, PartialEq)]
struct Vec2 {
    x: f64,
    y: f64,
}

#[test]
fn test_custom_converters() {
    let mut db = Database::new();
    let vec2 = db
        .types()
        .register_class(ClassSchema::new("Vec2").value_type())
        .unwrap();
    let percent = db
        .types()
        .register_class(ClassSchema::new("Percent").value_type())
        .unwrap();
    db.types()
        .register_class(
            ClassSchema::definition("Sprite")
                .field("Position", vec2)
                .field("Opacity", percent),
        )
        .unwrap();

    db.start_loading(LoadConfig::default(), false).unwrap();
    let session = db.session_mut().unwrap();
    session.add_converter(Rc::new(
        CsvConverter::new("Vec2", vec2, 2..=2, |parts, _| {
            Ok(Value::Custom(CustomValue::new(Vec2 {
                x: parts[0],
                y: parts[1],
            })))
        })
        .require_brackets(),
    ));
    session.add_converter(Rc::new(SimpleConverter::new("Percent", percent, |text| {
        let number = text.trim().trim_end_matches('%');
        number
            .parse::<f64>()
            .map(|p| Value::Float(p / 100.0))
            .map_err(|_| ConvertError::invalid(text, "Percent", "expected a percentage"))
    })));

    db.add_document_str(
        indoc! {r#"
            <Defs>
                <Ghost Type="Sprite">
                    <Position>(1.5, -2)</Position>
                    <Opacity>25%</Opacity>
                </Ghost>
                <Broken Type="Sprite">
                    <Position>1.5, -2</Position>
                </Broken>
            </Defs>
        "#},
        "sprites.xml",
    )
    .unwrap();
    assert_eq!(db.finish_loading(), Ok(2));

    assert_eq!(db.diagnostics().error_count(), 1);
    let ghost = db.get("Ghost").unwrap().borrow();
    assert_eq!(
        ghost.get("Position").and_then(Value::as_custom::<Vec2>),
        Some(&Vec2 { x: 1.5, y: -2.0 })
    );
    assert_eq!(ghost.get_f64("Opacity"), Some(0.25));
}

#[test]
fn test_collection_type_overrides() {
    let mut db = Database::new();
    let types = db.types();
    types
        .register_enum(EnumSchema::new("Size").variant("Small").variant("Large"))
        .unwrap();
    let animal = types
        .register_class(ClassSchema::new("Animal").field("Name", "string"))
        .unwrap();
    let dog = types
        .register_class(ClassSchema::new("Dog").extends(animal).field("Good", "bool"))
        .unwrap();
    types
        .register_class(
            ClassSchema::definition("Kennel")
                .field("Pets", "List<Animal>")
                .field("Strays", "List<Animal>")
                .field("Pens", "Dictionary<object, Animal>")
                .field("Sizes", "ReadOnlyList<int>"),
        )
        .unwrap();

    let report = load(
        &mut db,
        &[(
            "kennels.xml",
            indoc! {r#"
                <Defs>
                    <Yard Type="Kennel">
                        <Pets ElementType="Dog">
                            <li><Name>rex</Name><Good>true</Good></li>
                        </Pets>
                        <Strays ElementType="int">
                            <li><Name>mutt</Name></li>
                        </Strays>
                        <Pens KeyType="Size" ElementType="Dog">
                            <Small><Name>fido</Name></Small>
                        </Pens>
                        <Sizes><li>1</li></Sizes>
                    </Yard>
                </Defs>
            "#},
        )],
        LoadConfig::default(),
    )
    .unwrap();

    let error_paths: Vec<String> = report
        .errors()
        .map(|d| d.path.clone().unwrap_or_default())
        .collect();
    assert_eq!(error_paths, vec!["Yard/Strays", "Yard/Sizes"]);

    let yard = db.get("Yard").unwrap().borrow();
    let pets = yard.get_list("Pets").unwrap();
    assert_eq!(pets.len(), 1);
    let rex = pets.get(0).and_then(Value::as_object).unwrap();
    assert_eq!(rex.borrow().type_handle(), dog);
    assert_eq!(rex.borrow().get_bool("Good"), Some(true));

    let strays = yard.get_list("Strays").unwrap();
    let mutt = strays.get(0).and_then(Value::as_object).unwrap();
    assert_eq!(mutt.borrow().type_handle(), animal);
    assert_eq!(mutt.borrow().get_str("Name"), Some("mutt"));

    let pens = yard.get_map("Pens").unwrap();
    assert_eq!(pens.len(), 1);
    let (key, fido) = pens.iter().next().unwrap();
    assert_eq!(key.as_enum().map(|e| e.name.as_str()), Some("Small"));
    assert_eq!(fido.as_object().unwrap().borrow().type_handle(), dog);

    assert_eq!(yard.get("Sizes"), Some(&Value::Null));
}

#[test]
fn test_polymorphic_queries() {
    let mut db = Database::new();
    let types = db.types();
    let usable = types.register_interface(InterfaceSchema::new("Usable")).unwrap();
    let item = types
        .register_class(ClassSchema::definition("Item").is_abstract().field("Weight", "float"))
        .unwrap();
    let potion = types
        .register_class(ClassSchema::new("Potion").extends(item).implements(usable))
        .unwrap();
    let rock = types.register_class(ClassSchema::new("Rock").extends(item)).unwrap();

    let report = load(
        &mut db,
        &[(
            "items.xml",
            indoc! {r#"
                <Defs>
                    <Heal Type="Potion"><Weight>0.5</Weight></Heal>
                    <Pebble Type="Rock"/>
                    <Mana Type="Potion"/>
                    <Thing Type="Item"/>
                </Defs>
            "#},
        )],
        LoadConfig::default(),
    )
    .unwrap();

    assert_eq!(report.errors().count(), 1);
    assert_eq!(db.count(), 3);

    let ids = |ty| db.all_of(ty).iter().map(|d| d.id().to_string()).collect::<Vec<_>>();
    assert_eq!(ids(item), vec!["Heal", "Pebble", "Mana"]);
    assert_eq!(ids(usable), vec!["Heal", "Mana"]);
    assert_eq!(ids(potion), vec!["Heal", "Mana"]);
    assert_eq!(ids(rock), vec!["Pebble"]);
    assert_eq!(ids(db.types().definition()).len(), 3);
    assert!(db.get_as("Heal", usable).is_some());
    assert!(db.get_as("Pebble", usable).is_none());
}

#[test]
fn test_session_misuse() {
    let mut db = Database::new();
    assert_eq!(db.finish_loading(), Err(SessionError::NotLoading));
    db.start_loading(LoadConfig::default(), false).unwrap();
    let result = load(&mut db, &[("a.xml", "<Defs/>")], LoadConfig::default());
    assert!(matches!(
        result,
        Err(deftree::DefineError::Session(SessionError::AlreadyLoading))
    ));
    assert_eq!(db.finish_loading(), Ok(0));
}
