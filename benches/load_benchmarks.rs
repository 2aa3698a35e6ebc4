use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use deftree::diagnostics::Diagnostics;
use deftree::inheritance::MasterDocument;
use deftree::parser::{parse_str, Parser};
use deftree::schema::ClassSchema;
use deftree::{load, lexer::Lexer, Database, LoadConfig};

// ============================================================================
// Test Data
// ============================================================================

const SMALL_DEFS: &str = r#"<Defs>
    <Dagger Type="Weapon">
        <Label>dagger</Label>
        <Damage>3</Damage>
        <Tags><li>sharp</li></Tags>
    </Dagger>
</Defs>"#;

/// `count` definitions, each inheriting from the one before it.
fn generate_chain(count: usize) -> String {
    let mut out = String::from("<Defs>\n");
    out.push_str(r#"    <W0 Type="Weapon"><Label>w0</Label><Damage>1</Damage>"#);
    out.push_str("<Tags><li>t0</li></Tags></W0>\n");
    for i in 1..count {
        out.push_str(&format!(
            "    <W{i} Parent=\"W{p}\"><Damage>{i}</Damage><Tags><li>t{i}</li></Tags></W{i}>\n",
            i = i,
            p = i - 1
        ));
    }
    out.push_str("</Defs>\n");
    out
}

/// `count` independent definitions sharing one abstract parent.
fn generate_flat(count: usize) -> String {
    let mut out = String::from("<Defs>\n");
    out.push_str(r#"    <Base Abstract="true" Type="Weapon"><Label>base</Label>"#);
    out.push_str("<Tags><li>a</li><li>b</li></Tags></Base>\n");
    for i in 0..count {
        out.push_str(&format!(
            "    <Item{i} Parent=\"Base\"><Damage>{i}</Damage><Next>Item{n}</Next></Item{i}>\n",
            i = i,
            n = (i + 1) % count
        ));
    }
    out.push_str("</Defs>\n");
    out
}

fn weapon_database() -> Database {
    let db = Database::new();
    db.types()
        .register_class(
            ClassSchema::definition("Weapon")
                .field("Label", "string")
                .field("Damage", "int")
                .field("Tags", "List<string>")
                .field("Next", "Weapon"),
        )
        .unwrap_or_else(|e| panic!("{}", e));
    db
}

// ============================================================================
// Front-end
// ============================================================================

fn bench_lexer(c: &mut Criterion) {
    let mut group = c.benchmark_group("lexer_by_size");
    for size in [10, 100, 1000] {
        let source = generate_flat(size);
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &source, |b, src| {
            b.iter(|| Lexer::new(black_box(src)).lex());
        });
    }
    group.finish();
}

fn bench_parser(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser_by_size");
    for size in [10, 100, 1000] {
        let source = generate_flat(size);
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &source, |b, src| {
            b.iter(|| Parser::new(black_box(src)).parse_document());
        });
    }
    group.finish();
}

// ============================================================================
// Inheritance
// ============================================================================

fn bench_inheritance_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("inheritance_chain_depth");
    for depth in [10, 50, 200] {
        let document =
            parse_str(&generate_chain(depth), "chain.xml").unwrap_or_else(|e| panic!("{}", e));
        group.throughput(Throughput::Elements(depth as u64));
        group.bench_with_input(BenchmarkId::from_parameter(depth), &document, |b, doc| {
            b.iter(|| {
                let mut master = MasterDocument::new();
                master.append(doc, "chain.xml");
                let diagnostics = Diagnostics::new();
                master.resolve_inheritance("li", &diagnostics).map(|_| master.len())
            });
        });
    }
    group.finish();
}

// ============================================================================
// End to end
// ============================================================================

fn bench_e2e_small(c: &mut Criterion) {
    c.bench_function("e2e_small", |b| {
        b.iter(|| {
            let mut db = weapon_database();
            let files = [("small.xml", black_box(SMALL_DEFS))];
            load(&mut db, &files, LoadConfig::default()).map(|r| r.loaded)
        });
    });
}

fn bench_e2e_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("e2e_definition_scaling");
    group.sample_size(20);
    for size in [10, 100, 1000] {
        let source = generate_flat(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &source, |b, src| {
            b.iter(|| {
                let mut db = weapon_database();
                let files = [("flat.xml", black_box(src.as_str()))];
                load(&mut db, &files, LoadConfig::default()).map(|r| r.loaded)
            });
        });
    }
    group.finish();
}

fn bench_e2e_with_serialization(c: &mut Criterion) {
    let source = generate_flat(100);
    c.bench_function("e2e_with_json_serialization", |b| {
        b.iter(|| {
            let mut db = weapon_database();
            let files = [("flat.xml", black_box(source.as_str()))];
            let _ = load(&mut db, &files, LoadConfig::default());
            db.to_json()
        });
    });
}

criterion_group!(
    benches,
    bench_lexer,
    bench_parser,
    bench_inheritance_chain,
    bench_e2e_small,
    bench_e2e_scaling,
    bench_e2e_with_serialization,
);
criterion_main!(benches);
