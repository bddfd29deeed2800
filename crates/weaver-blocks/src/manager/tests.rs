use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use web_time::Instant;

use super::*;
use crate::document::{BlockChange, DocumentEvent, EventOrigin};
use crate::test_support::{ids, manager_with, memory_manager, text_data, texts};
use crate::undo::{DocumentOp, MemoryDocument};

fn record(manager: &mut BlockManager<MemoryDocument>) -> Rc<RefCell<Vec<BlockMutation>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    manager.subscribe(move |m| sink.borrow_mut().push(m.clone()));
    log
}

#[test]
fn test_insert_defaults_to_after_current() {
    let mut manager = manager_with(&["a", "b", "c"]);
    manager.set_current_index(Some(0)).unwrap();

    let id = manager
        .insert(InsertOptions::new().data(text_data("x")).without_focus())
        .unwrap();
    assert_eq!(manager.index_of(&id), Some(1));
    assert_eq!(manager.current_index(), Some(0));

    let front = manager
        .insert(InsertOptions::new().at(0).without_focus())
        .unwrap();
    assert_eq!(manager.index_of(&front), Some(0));
    assert_eq!(manager.current_index(), Some(1));

    let focused = manager.insert(InsertOptions::new()).unwrap();
    assert_eq!(manager.current_index(), manager.index_of(&focused));
}

#[test]
fn test_insert_without_default_tool() {
    let mut manager = BlockManager::new(
        BlocksConfig::default(),
        crate::test_support::registry(),
        MemoryDocument::default(),
    );
    assert!(matches!(
        manager.insert(InsertOptions::new()),
        Err(BlockError::NoDefaultTool)
    ));
    assert!(matches!(
        manager.insert(InsertOptions::new().tool("quote")),
        Err(BlockError::UnknownTool(_))
    ));
}

#[test]
fn test_insert_pushes_one_add() {
    let mut manager = manager_with(&["a"]);
    manager.set_current_index(Some(0)).unwrap();
    manager.document_mut().clear_ops();
    let id = manager.insert(InsertOptions::new()).unwrap();
    assert_eq!(
        manager.document().ops(),
        [DocumentOp::Add { id, index: 1 }]
    );

    manager.document_mut().clear_ops();
    manager
        .insert(InsertOptions::new().skip_sync())
        .unwrap();
    assert!(manager.document().ops().is_empty());
}

#[test]
fn test_current_index_stays_in_bounds() {
    let mut rng = fastrand::Rng::with_seed(7);
    let mut manager = manager_with(&["a", "b"]);

    for _ in 0..300 {
        let len = manager.len();
        if len > 0 && rng.bool() {
            let id = manager.block_at(rng.usize(..len)).unwrap().id().clone();
            manager.remove(&id, rng.bool(), false).unwrap();
        } else {
            let mut options = InsertOptions::new();
            if rng.bool() {
                options = options.at(rng.usize(..=len));
            }
            if rng.bool() {
                options = options.without_focus();
            }
            manager.insert(options).unwrap();
        }
        if let Some(current) = manager.current_index() {
            assert!(current < manager.len(), "{current} >= {}", manager.len());
        }
    }
}

#[test]
fn test_remove_only_block() {
    let mut manager = manager_with(&["a"]);
    manager.remove("b0", true, false).unwrap();
    assert_eq!(manager.len(), 1);
    assert_eq!(manager.current_index(), Some(0));
    assert_eq!(manager.block_at(0).unwrap().name(), "paragraph");

    let mut manager = manager_with(&["a"]);
    manager.remove("b0", false, false).unwrap();
    assert!(manager.is_empty());
    assert_eq!(manager.current_index(), None);
}

#[test]
fn test_remove_adjusts_current_index() {
    let mut manager = manager_with(&["a", "b", "c"]);
    manager.set_current_index(Some(2)).unwrap();
    manager.remove("b1", false, false).unwrap();
    assert_eq!(manager.current_index(), Some(1));

    manager.remove("b0", false, false).unwrap();
    assert_eq!(manager.current_index(), Some(0));
}

#[test]
fn test_remove_missing_block() {
    let mut manager = manager_with(&["a"]);
    assert!(matches!(
        manager.remove("nope", false, false),
        Err(BlockError::BlockNotFound(id)) if id == "nope"
    ));
}

#[test]
fn test_move_to_same_index_is_noop() {
    let mut manager = manager_with(&["a", "b", "c"]);
    let log = record(&mut manager);
    manager.document_mut().clear_ops();

    manager.move_block(1, 1, false).unwrap();
    assert!(log.borrow().is_empty());
    assert!(manager.document().ops().is_empty());
}

#[test]
fn test_move_pushes_and_closes_undo_group() {
    let mut manager = manager_with(&["a", "b"]);
    let log = record(&mut manager);
    manager.document_mut().clear_ops();

    manager.move_block(1, 0, false).unwrap();
    assert_eq!(ids(&manager), ["b1", "b0"]);
    assert_eq!(manager.current_index(), Some(1));
    assert_eq!(
        manager.document().ops(),
        [
            DocumentOp::Move {
                id: "b0".into(),
                index: 1
            },
            DocumentOp::StopCapturing
        ]
    );
    assert_eq!(
        *log.borrow(),
        [BlockMutation::Moved {
            id: "b0".into(),
            from: 0,
            to: 1,
            render: true
        }]
    );
}

#[test]
fn test_move_out_of_range() {
    let mut manager = manager_with(&["a", "b"]);
    assert!(matches!(
        manager.move_block(5, 0, false),
        Err(BlockError::IndexOutOfRange { index: 5, len: 2 })
    ));
    assert_eq!(ids(&manager), ["b0", "b1"]);
}

#[test]
fn test_split_then_undo_restores_single_block() {
    let mut manager = manager_with(&["abcd"]);
    manager.set_current_index(Some(0)).unwrap();

    let new_id = manager.split(2).unwrap();
    assert_eq!(texts(&manager), ["ab", "cd"]);
    assert_eq!(manager.index_of(&new_id), Some(1));
    assert_eq!(manager.current_index(), Some(1));
    assert_eq!(manager.document().undo_depth(), 1);

    assert!(manager.undo());
    assert_eq!(texts(&manager), ["abcd"]);

    assert!(manager.redo());
    assert_eq!(texts(&manager), ["ab", "cd"]);
}

#[test]
fn test_split_without_current_block() {
    let mut manager = manager_with(&["abcd"]);
    assert!(matches!(manager.split(1), Err(BlockError::NoCurrentBlock)));
}

#[tokio::test]
async fn test_merge_same_tool_sanitizes_source() {
    let mut manager = manager_with(&["a", "<script>x</script><b>y</b>"]);

    assert!(manager.merge_blocks("b0", "b1").await.unwrap());
    assert_eq!(texts(&manager), ["ax<b>y</b>"]);
    assert_eq!(manager.current_index(), Some(0));
    assert_eq!(
        manager.document().get_block("b0").unwrap().data,
        text_data("ax<b>y</b>")
    );

    assert!(manager.undo());
    assert_eq!(texts(&manager), ["a", "<script>x</script><b>y</b>"]);
}

#[tokio::test]
async fn test_merge_through_conversion() {
    let mut manager = memory_manager();
    manager
        .insert_many(
            vec![
                BlockDescriptor::new("h", "header", text_data("Title ")),
                BlockDescriptor::new("p", "paragraph", text_data("<b>bold</b>")),
            ],
            0,
        )
        .unwrap();

    assert!(manager.merge_blocks("h", "p").await.unwrap());
    assert_eq!(texts(&manager), ["Title bold"]);
}

#[tokio::test]
async fn test_merge_with_failing_source_keeps_both() {
    let mut manager = memory_manager();
    manager
        .insert_many(
            vec![
                BlockDescriptor::new("p", "paragraph", text_data("a")),
                BlockDescriptor::new("x", "broken", text_data("kept")),
            ],
            0,
        )
        .unwrap();

    assert!(!manager.merge_blocks("p", "x").await.unwrap());
    assert_eq!(manager.len(), 2);
    assert_eq!(
        manager.block("x").unwrap().preserved_data(),
        text_data("kept")
    );
}

#[tokio::test]
async fn test_convert_is_one_labelled_step() {
    let mut manager = manager_with(&["<i>hi</i>"]);
    manager.document_mut().clear_ops();

    let id = manager.convert("b0", "header", None).await.unwrap();
    assert_eq!(manager.len(), 1);
    assert_eq!(manager.block(&id).unwrap().name(), "header");
    assert_eq!(texts(&manager), ["hi"]);

    let label = manager
        .document()
        .ops()
        .iter()
        .find_map(|op| match op {
            DocumentOp::Begin { label } => label.clone(),
            _ => None,
        })
        .unwrap();
    assert!(uuid::Uuid::parse_str(&label).is_ok());
    assert_eq!(manager.document().undo_depth(), 1);

    assert!(manager.undo());
    assert_eq!(ids(&manager), ["b0"]);
    assert_eq!(manager.block("b0").unwrap().name(), "paragraph");
    assert_eq!(texts(&manager), ["<i>hi</i>"]);
}

#[tokio::test]
async fn test_convert_errors() {
    let mut manager = manager_with(&["a"]);
    assert!(matches!(
        manager.convert("b0", "quote", None).await,
        Err(BlockError::UnknownTool(_))
    ));
    assert!(matches!(
        manager.convert("b0", "broken", None).await,
        Err(BlockError::NotConvertible { .. })
    ));
}

#[tokio::test]
async fn test_convert_applies_overrides() {
    let mut manager = manager_with(&["hello"]);
    let mut overrides = BlockData::new();
    overrides.insert("level".into(), 2.into());

    let id = manager
        .convert("b0", "header", Some(overrides))
        .await
        .unwrap();
    let data = manager.block(&id).unwrap().preserved_data();
    assert_eq!(data["text"], "hello");
    assert_eq!(data["level"], 2);
}

#[test]
fn test_replace_fires_about_to_be_removed_first() {
    let mut manager = manager_with(&["a"]);
    let log = record(&mut manager);

    let id = manager.replace("b0", "header", text_data("x")).unwrap();
    assert_eq!(
        *log.borrow(),
        [
            BlockMutation::AboutToBeRemoved {
                id: "b0".into(),
                index: 0
            },
            BlockMutation::Removed {
                id: "b0".into(),
                index: 0
            },
            BlockMutation::Added { id, index: 0 },
        ]
    );
}

#[test]
fn test_delete_partial_selection() {
    let mut manager = manager_with(&["a", "b", "c"]);
    manager.select("b0", true).unwrap();
    manager.select("b2", true).unwrap();

    assert_eq!(
        manager.delete_selected_blocks_and_insert_replacement().unwrap(),
        None
    );
    assert_eq!(texts(&manager), ["b"]);
    assert_eq!(manager.document().undo_depth(), 1);

    assert!(manager.undo());
    assert_eq!(texts(&manager), ["a", "b", "c"]);
}

#[test]
fn test_delete_all_selected_inserts_replacement() {
    let mut manager = manager_with(&["a", "b"]);
    manager.select_all();
    assert!(manager.is_all_selected());

    let id = manager
        .delete_selected_blocks_and_insert_replacement()
        .unwrap()
        .unwrap();
    assert_eq!(ids(&manager), [id.as_str()]);
    assert_eq!(manager.document().undo_depth(), 1);

    assert!(manager.undo());
    assert_eq!(texts(&manager), ["a", "b"]);
}

#[test]
fn test_delete_with_nothing_selected() {
    let mut manager = manager_with(&["a"]);
    assert_eq!(
        manager.delete_selected_blocks_and_insert_replacement().unwrap(),
        None
    );
    assert_eq!(manager.len(), 1);
}

#[test]
fn test_clear() {
    let mut manager = manager_with(&["a", "b"]);
    let id = manager.clear(true).unwrap();
    assert_eq!(manager.len(), 1);
    assert_eq!(manager.index_of(id.as_deref().unwrap()), Some(0));

    assert!(manager.undo());
    assert_eq!(texts(&manager), ["a", "b"]);

    assert_eq!(manager.clear(false).unwrap(), None);
    assert!(manager.is_empty());
    assert_eq!(manager.current_index(), None);
}

#[test]
fn test_hierarchy_depth_and_indent() {
    let mut manager = manager_with(&["p", "c", "g"]);
    manager.set_block_parent("b1", Some("b0")).unwrap();
    manager.set_block_parent("b2", Some("b1")).unwrap();

    assert_eq!(manager.block_depth("b2").unwrap(), 2);
    assert_eq!(manager.block("b2").unwrap().indent(), 2);
    assert_eq!(manager.block("b0").unwrap().content_ids(), ["b1"]);
    assert_eq!(
        manager.document().get_block("b2").unwrap().parent.as_deref(),
        Some("b1")
    );

    assert!(matches!(
        manager.set_block_parent("b0", Some("b2")),
        Err(BlockError::ParentCycle { .. })
    ));

    manager.set_block_parent("b1", None).unwrap();
    assert_eq!(manager.block_depth("b2").unwrap(), 1);
    assert!(manager.block("b0").unwrap().content_ids().is_empty());
}

#[test]
fn test_removing_parent_promotes_children() {
    let mut manager = manager_with(&["root", "mid", "leaf"]);
    manager.set_block_parent("b1", Some("b0")).unwrap();
    manager.set_block_parent("b2", Some("b1")).unwrap();

    manager.remove("b1", false, false).unwrap();
    assert_eq!(
        manager.block("b2").unwrap().parent_id().map(|p| p.as_str()),
        Some("b0")
    );
    assert_eq!(manager.block("b0").unwrap().content_ids(), ["b2"]);
    assert_eq!(manager.block("b2").unwrap().indent(), 1);
    assert_eq!(
        manager.document().get_block("b2").unwrap().parent.as_deref(),
        Some("b0")
    );
}

#[test]
fn test_insert_many_links_parents() {
    let mut manager = memory_manager();
    manager
        .insert_many(
            vec![
                BlockDescriptor::new("t", "paragraph", text_data("table")),
                BlockDescriptor::new("c", "paragraph", text_data("cell")).with_parent("t"),
                BlockDescriptor::new("o", "paragraph", text_data("orphan")).with_parent("gone"),
            ],
            0,
        )
        .unwrap();

    assert_eq!(manager.block("t").unwrap().content_ids(), ["c"]);
    assert_eq!(manager.block("c").unwrap().indent(), 1);
    assert_eq!(manager.block("o").unwrap().parent_id(), None);
    assert!(!manager.can_undo());
}

#[test]
fn test_selection_queries() {
    let mut manager = manager_with(&["a", " ", "c"]);
    manager.set_current_index(Some(0)).unwrap();
    assert_eq!(manager.next_block().unwrap().id(), "b1");
    assert_eq!(manager.next_contentful_block().unwrap().id(), "b2");
    assert!(manager.previous_block().is_none());

    manager.set_current_index(Some(2)).unwrap();
    assert_eq!(manager.previous_contentful_block().unwrap().id(), "b0");
    assert_eq!(manager.last_block().unwrap().id(), "b2");
    assert!(manager.set_current_index(Some(3)).is_err());
}

#[tokio::test]
async fn test_block_change_pushes_changed_keys_only() {
    let mut manager = manager_with(&["a"]);
    manager.document_mut().clear_ops();

    manager
        .block_mut("b0")
        .unwrap()
        .set_data(&text_data("changed"));
    assert!(manager.sync_block_changed("b0").await.unwrap());
    assert_eq!(
        manager.document().get_block("b0").unwrap().data,
        text_data("changed")
    );
    assert!(manager.document().ops().contains(&DocumentOp::UpdateData {
        id: "b0".into(),
        key: "text".into()
    }));

    assert!(!manager.sync_block_changed("b0").await.unwrap());
}

#[tokio::test]
async fn test_block_change_waits_for_deferred_binding() {
    let mut manager = memory_manager();
    manager
        .insert_many(vec![BlockDescriptor::new("a", "paragraph", text_data("1"))], 0)
        .unwrap();
    manager.block_mut("a").unwrap().set_data(&text_data("2"));

    assert!(!manager.sync_block_changed("a").await.unwrap());
    assert_eq!(manager.flush_deferred_bindings(Instant::now(), true), 1);
    assert!(manager.sync_block_changed("a").await.unwrap());
}

#[test]
fn test_deferred_binding_timeout() {
    let mut manager = memory_manager();
    manager
        .insert_many(vec![BlockDescriptor::new("a", "paragraph", text_data(""))], 0)
        .unwrap();
    assert!(manager.has_deferred_bindings());

    assert_eq!(manager.flush_deferred_bindings(Instant::now(), false), 0);
    let later = Instant::now() + Duration::from_millis(2001);
    assert_eq!(manager.flush_deferred_bindings(later, false), 1);
    assert!(!manager.has_deferred_bindings());

    let user = manager.insert(InsertOptions::new()).unwrap();
    assert_eq!(
        manager.block(&user).unwrap().listeners(),
        ListenerBinding::Bound
    );
}

#[tokio::test]
async fn test_update_tune_recomposes_and_pushes() {
    let mut manager = manager_with(&["a"]);
    manager
        .update_tune("b0", "alignment", serde_json::json!("center"))
        .await
        .unwrap();

    let block = manager.block("b0").unwrap();
    assert_eq!(block.tunes()["alignment"], "center");
    assert_eq!(block.preserved_data(), text_data("a"));
    assert_eq!(
        manager.document().get_block("b0").unwrap().tunes["alignment"],
        "center"
    );
}

#[test]
fn test_undo_to_empty_inserts_placeholder_and_keeps_redo() {
    let mut manager = memory_manager();
    manager
        .insert(InsertOptions::new().data(text_data("first")))
        .unwrap();

    assert!(manager.undo());
    assert_eq!(manager.len(), 1);
    assert_eq!(texts(&manager), [""]);
    assert!(manager.can_redo());

    assert!(manager.redo());
    assert_eq!(texts(&manager), ["first"]);
}

#[test]
fn test_move_events_coalesce_into_one_resync() {
    let mut manager = manager_with(&["a", "b", "c"]);
    manager.document_mut().move_block("b2", 0);
    manager.document_mut().clear_ops();
    let log = record(&mut manager);

    let moved = |id: &str, index| {
        DocumentEvent::new(
            EventOrigin::Remote,
            BlockChange::Moved {
                id: id.into(),
                index,
            },
        )
    };
    manager.apply_document_events(vec![moved("b2", 0), moved("b0", 1), moved("b1", 2)]);

    assert_eq!(ids(&manager), ["b2", "b0", "b1"]);
    assert_eq!(log.borrow().len(), 1);
    assert!(manager.document().ops().is_empty());
}

#[test]
fn test_document_update_recomposes_on_tune_change() {
    let mut manager = manager_with(&["a"]);
    let mut descriptor = manager.document().get_block("b0").unwrap();
    descriptor.tunes.insert("alignment".into(), serde_json::json!("right"));
    descriptor.data = text_data("remote");

    manager.apply_document_events(vec![DocumentEvent::new(
        EventOrigin::Remote,
        BlockChange::Updated {
            block: descriptor,
            tunes_changed: true,
        },
    )]);
    let block = manager.block("b0").unwrap();
    assert_eq!(block.tunes()["alignment"], "right");
    assert_eq!(texts(&manager), ["remote"]);
}

/// Mergeable text tool whose save fails once it has absorbed another block.
struct FragileTool {
    text: String,
    merged: bool,
}

impl FragileTool {
    fn new(data: &BlockData) -> Self {
        Self {
            text: data
                .get("text")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            merged: false,
        }
    }
}

impl crate::tools::BlockTool for FragileTool {
    fn save(
        &self,
    ) -> futures_util::future::LocalBoxFuture<'_, std::result::Result<BlockData, crate::error::ToolError>>
    {
        use futures_util::FutureExt;
        let result = if self.merged {
            Err(crate::error::ToolError::new("fragile", "merged content lost"))
        } else {
            Ok(text_data(&self.text))
        };
        async move { result }.boxed_local()
    }

    fn set_data(&mut self, data: &BlockData) -> std::result::Result<(), crate::error::ToolError> {
        *self = Self::new(data);
        Ok(())
    }

    fn merge(&mut self, data: &BlockData) -> std::result::Result<(), crate::error::ToolError> {
        if let Some(text) = data.get("text").and_then(|v| v.as_str()) {
            self.text.push_str(text);
        }
        self.merged = true;
        Ok(())
    }

    fn name(&self) -> &str {
        "fragile"
    }
}

#[tokio::test]
async fn test_merge_with_unsaveable_result_changes_nothing() {
    let mut registry = crate::test_support::registry();
    registry.register(
        crate::tools::ToolDefinition::new("fragile", |data, _| Box::new(FragileTool::new(data)))
            .mergeable(true),
    );
    let mut manager = BlockManager::new(
        BlocksConfig::default().with_default_tool("paragraph"),
        registry,
        MemoryDocument::default(),
    );
    manager
        .insert_many(
            vec![
                BlockDescriptor::new("t", "fragile", text_data("cd")),
                BlockDescriptor::new("s", "fragile", text_data("ab")),
            ],
            0,
        )
        .unwrap();
    manager.document_mut().clear_ops();

    assert!(!manager.merge_blocks("t", "s").await.unwrap());
    assert_eq!(ids(&manager), ["t", "s"]);
    let live = manager.block("t").unwrap().save().await.unwrap();
    assert_eq!(live.data, text_data("cd"));
    assert_eq!(manager.document().get_block("t").unwrap().data, text_data("cd"));
    assert!(manager.document().ops().is_empty());
}

#[test]
fn test_structural_changes_inside_transact_reach_document() {
    let mut manager = manager_with(&["a", "b", "c"]);
    manager
        .transact(|manager| -> Result<()> {
            manager.move_block(2, 0, false)?;
            manager.set_block_parent("b1", Some("b2"))
        })
        .unwrap();

    assert_eq!(ids(&manager), ["b1", "b2", "b0"]);
    let document_order: Vec<_> = manager.document().to_json().into_iter().map(|b| b.id).collect();
    assert_eq!(document_order, ["b1", "b2", "b0"]);
    assert_eq!(
        manager.document().get_block("b1").unwrap().parent.as_deref(),
        Some("b2")
    );
    assert_eq!(manager.document().undo_depth(), 1);

    assert!(manager.undo());
    assert_eq!(ids(&manager), ["b0", "b1", "b2"]);
    assert_eq!(manager.block("b1").unwrap().parent_id(), None);
}

#[test]
fn test_insert_many_rejects_repeated_ids() {
    let mut manager = memory_manager();
    let result = manager.insert_many(
        vec![
            BlockDescriptor::new("x", "paragraph", text_data("1")),
            BlockDescriptor::new("x", "paragraph", text_data("2")),
        ],
        0,
    );
    assert!(matches!(result, Err(BlockError::DuplicateId(id)) if id == "x"));
    assert!(manager.is_empty());
    assert!(manager.document().is_empty());
}

#[test]
fn test_remove_last_block_with_replacement_is_one_step() {
    let mut manager = manager_with(&["a"]);
    manager.remove("b0", true, false).unwrap();
    assert_eq!(manager.len(), 1);
    assert_eq!(manager.document().undo_depth(), 1);

    assert!(manager.undo());
    assert_eq!(ids(&manager), ["b0"]);
    assert_eq!(texts(&manager), ["a"]);
    assert!(!manager.can_undo());
}
