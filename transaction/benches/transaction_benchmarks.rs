use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use redlilium_transaction::operations::{add_entity, insert_between};
use redlilium_transaction::{
    Document, EntityBlueprint, EntityId, FieldDiff, Schema, TransactionContext,
};

fn control(name: &str) -> EntityBlueprint {
    let schema = Arc::new(
        Schema::new("GuiControl")
            .with_field("position", "0 0")
            .with_field("extent", "64 32")
            .with_field("text", "")
            .with_field("visible", true)
            .with_field("size", 4),
    );
    EntityBlueprint::new(schema).named(name)
}

fn flat_document(count: usize) -> (Document, Vec<EntityId>) {
    let mut doc = Document::new();
    let root = doc.root();
    let ids = (0..count)
        .map(|i| {
            let id = doc.spawn(&control(&format!("C{i}")), root, i).unwrap();
            doc.get_mut(id).unwrap().set_field("tooltip", "hint");
            id
        })
        .collect();
    (doc, ids)
}

// ---------------------------------------------------------------------------
// Watch / learn
// ---------------------------------------------------------------------------

fn bench_watch_learn_unchanged(c: &mut Criterion) {
    let (doc, ids) = flat_document(100);
    c.bench_function("watch_learn_100_unchanged", |b| {
        b.iter(|| {
            let mut diff = FieldDiff::new();
            diff.watch_set(&doc, &ids).unwrap();
            black_box(diff.learn_set(&doc, &ids).unwrap())
        });
    });
}

fn bench_watch_learn_changed(c: &mut Criterion) {
    let (mut doc, ids) = flat_document(100);
    c.bench_function("watch_learn_100_changed", |b| {
        let mut size = 0;
        b.iter(|| {
            let mut diff = FieldDiff::new();
            diff.watch_set(&doc, &ids).unwrap();
            size += 1;
            for &id in &ids {
                doc.get_mut(id).unwrap().set_field("size", size);
            }
            black_box(diff.learn_set(&doc, &ids).unwrap())
        });
    });
}

// ---------------------------------------------------------------------------
// Undo / redo
// ---------------------------------------------------------------------------

fn bench_field_edit_undo_redo(c: &mut Criterion) {
    let (mut doc, ids) = flat_document(100);
    let mut ctx = TransactionContext::new();
    ctx.on_pre_edit(&doc, &ids).unwrap();
    for &id in &ids {
        doc.get_mut(id).unwrap().set_field("size", 10);
    }
    ctx.on_post_edit(&mut doc, &ids).unwrap();

    c.bench_function("field_edit_100_undo_redo", |b| {
        b.iter(|| {
            ctx.undo(&mut doc).unwrap();
            black_box(ctx.redo(&mut doc).unwrap())
        });
    });
}

fn bench_insert_between_undo_redo(c: &mut Criterion) {
    let (mut doc, _) = flat_document(32);
    let mut ctx = TransactionContext::new();
    let root = doc.root();
    let parent = add_entity(&mut ctx, &mut doc, &control("Parent"), root, 0, "Add").unwrap();
    let child = add_entity(&mut ctx, &mut doc, &control("Child"), parent, 0, "Add").unwrap();
    insert_between(&mut ctx, &mut doc, parent, child, &control("N"), "Insert Node").unwrap();

    c.bench_function("insert_between_undo_redo", |b| {
        b.iter(|| {
            ctx.undo(&mut doc).unwrap();
            black_box(ctx.redo(&mut doc).unwrap())
        });
    });
}

criterion_group!(
    benches,
    bench_watch_learn_unchanged,
    bench_watch_learn_changed,
    bench_field_edit_undo_redo,
    bench_insert_between_undo_redo,
);
criterion_main!(benches);
