//! Block manager driving a Loro document.

use weaver_blocks::test_support::{ids, registry, text_data, texts};
use weaver_blocks::{
    BlockDescriptor, BlockManager, BlocksConfig, DocumentLayer, DropTarget, Edge, InsertOptions,
};
use weaver_blocks::drag::move_blocks;
use weaver_blocks_crdt::{CrdtDocument, LoroBlockDocument, LoroDocumentConfig};

fn loro_manager(document: LoroBlockDocument) -> BlockManager<LoroBlockDocument> {
    BlockManager::new(
        BlocksConfig::default().with_default_tool("paragraph"),
        registry(),
        document,
    )
}

fn paragraphs(texts: &[&str]) -> Vec<BlockDescriptor> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| BlockDescriptor::new(format!("b{i}"), "paragraph", text_data(text)))
        .collect()
}

fn manager_with(texts: &[&str]) -> BlockManager<LoroBlockDocument> {
    let mut manager = loro_manager(LoroBlockDocument::default());
    manager.insert_many(paragraphs(texts), 0).unwrap();
    manager
}

#[test]
fn test_loaded_blocks_are_not_undoable() {
    let manager = manager_with(&["a", "b"]);
    assert_eq!(manager.document().len(), 2);
    assert!(!manager.can_undo());
}

#[test]
fn test_split_undo_redo() {
    let mut manager = manager_with(&["abcd"]);
    manager.set_current_index(Some(0)).unwrap();

    let new_id = manager.split(2).unwrap();
    assert_eq!(texts(&manager), ["ab", "cd"]);
    assert_eq!(manager.document().index_of(&new_id), Some(1));

    assert!(manager.undo());
    assert_eq!(texts(&manager), ["abcd"]);
    assert_eq!(manager.document().len(), 1);

    assert!(manager.redo());
    assert_eq!(texts(&manager), ["ab", "cd"]);
}

#[test]
fn test_multi_move_is_one_undo_step() {
    let mut manager = manager_with(&["a", "b", "c", "d"]);
    let sources = ["b1".into(), "b3".into()];
    move_blocks(&mut manager, &sources, &DropTarget::new("b0", Edge::Top)).unwrap();
    assert_eq!(ids(&manager), ["b1", "b3", "b0", "b2"]);
    let document_order: Vec<_> = manager.document().to_json().into_iter().map(|b| b.id).collect();
    assert_eq!(document_order, ["b1", "b3", "b0", "b2"]);

    assert!(manager.undo());
    assert_eq!(ids(&manager), ["b0", "b1", "b2", "b3"]);
    assert!(!manager.can_undo());
}

#[test]
fn test_collaborator_sees_local_edits() {
    let mut alice = manager_with(&["hello", "world"]);
    let snapshot = alice.document().export_snapshot().unwrap();
    alice.document_mut().mark_synced();

    let document = LoroBlockDocument::from_snapshot(&snapshot, LoroDocumentConfig::default()).unwrap();
    let loaded = document.to_json();
    let mut bob = loro_manager(document);
    bob.insert_many(loaded, 0).unwrap();
    assert_eq!(texts(&bob), ["hello", "world"]);
    // Loading what the document already holds adds nothing.
    assert_eq!(bob.document().len(), 2);

    alice.set_current_index(Some(0)).unwrap();
    alice.split(3).unwrap();
    alice
        .insert(InsertOptions::new().data(text_data("!")).at(3))
        .unwrap();
    let updates = alice.document().export_updates_since_sync().unwrap();
    alice.document_mut().mark_synced();

    let events = bob.document_mut().import(&updates).unwrap();
    bob.apply_document_events(events);
    assert_eq!(texts(&bob), ["hel", "lo", "world", "!"]);
    assert_eq!(ids(&bob), ids(&alice));
    // Remote changes never land on the local undo stack.
    assert!(!bob.can_undo());
}
