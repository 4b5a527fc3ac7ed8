use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use quarry::index::adapter::FileAdapter;
use quarry::index::{BuildStatus, ProgressEvent};
use quarry::{Engine, EngineConfig, FileStorage, IndexSettings, Storage};

fn write(dir: &Path, path: &str, bytes: usize) {
    let full = dir.join(path);
    fs::create_dir_all(full.parent().unwrap()).unwrap();
    fs::write(full, vec![b'x'; bytes]).unwrap();
}

fn open(project: &Path, cache: &Path) -> quarry::Result<Engine<FileAdapter>> {
    let settings = IndexSettings::new("assets").with_roots(["Assets"]);
    let adapter = FileAdapter::new(project, settings.clone())?;
    let storage: Arc<dyn Storage> = Arc::new(FileStorage::new(cache)?);
    let config = EngineConfig::builder(settings)
        .index_file("assets.index")
        .build();
    Engine::new(adapter, storage, config)
}

#[test]
fn test_build_persist_and_reload() -> quarry::Result<()> {
    // 1. Setup a project tree
    let project = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    write(project.path(), "Assets/Props/OakTree.prefab", 300);
    write(project.path(), "Assets/Props/Rock.prefab", 50);
    write(project.path(), "Assets/Art/OakBark.png", 4096);
    write(project.path(), "Assets/Props/Rock.prefab.meta", 1);

    // 2. Build
    let mut engine = open(project.path(), cache.path())?;
    let report = engine.build()?;
    assert_eq!(report.indexed, 3);
    assert!(report.failed.is_empty());
    assert!(engine.is_ready());

    // 3. Search
    assert_eq!(
        engine.search_ids("oak"),
        vec!["Assets/Art/OakBark.png", "Assets/Props/OakTree.prefab"]
    );
    assert_eq!(engine.search_ids("ext=prefab size<100"), vec!["Assets/Props/Rock.prefab"]);
    assert_eq!(engine.search_ids("\"rock.prefab\""), vec!["Assets/Props/Rock.prefab"]);
    assert!(engine.search_ids("meta").is_empty());
    assert!(engine.complete("ext:").contains(&"ext:png".to_string()));

    // 4. Reload from the persisted file
    assert!(cache.path().join("assets.index").exists());
    let reopened = open(project.path(), cache.path())?;
    assert!(reopened.load()?);
    assert_eq!(reopened.search_ids("oak"), engine.search_ids("oak"));
    assert_eq!(reopened.keywords(), engine.keywords());
    Ok(())
}

#[test]
fn test_refresh_follows_file_changes() -> quarry::Result<()> {
    let project = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    write(project.path(), "Assets/Crate.prefab", 10);
    write(project.path(), "Assets/Barrel.prefab", 10);

    let mut engine = open(project.path(), cache.path())?;
    assert!(engine.open()?.is_some());
    assert!(engine.refresh()?.is_none());

    // Grow one file, delete another, add a third
    write(project.path(), "Assets/Crate.prefab", 500);
    fs::remove_file(project.path().join("Assets/Barrel.prefab")).unwrap();
    write(project.path(), "Assets/Lamp.prefab", 10);

    let report = engine.refresh()?.expect("files changed");
    assert_eq!(report.indexed, 2);
    assert_eq!(report.removed, 1);
    assert!(engine.search_ids("barrel").is_empty());
    assert_eq!(engine.search_ids("size>=500"), vec!["Assets/Crate.prefab"]);
    assert_eq!(engine.search_ids("lamp"), vec!["Assets/Lamp.prefab"]);

    // The persisted copy follows the incremental update
    let reopened = open(project.path(), cache.path())?;
    assert!(reopened.load()?);
    assert_eq!(reopened.search_ids("lamp"), vec!["Assets/Lamp.prefab"]);
    Ok(())
}

#[test]
fn test_stepwise_build_reports_progress() -> quarry::Result<()> {
    let project = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    for name in ["A.txt", "B.txt", "C.txt"] {
        write(project.path(), &format!("Assets/{name}"), 1);
    }

    let mut engine = open(project.path(), cache.path())?;
    let (tx, rx) = crossbeam_channel::unbounded::<ProgressEvent>();
    let mut task = engine.build_task()?.with_progress(tx);
    assert_eq!(task.total(), 3);

    let mut ticks = 0;
    let report = loop {
        match task.step()? {
            BuildStatus::Running { processed, total } => {
                ticks += 1;
                assert_eq!((processed, total), (ticks, 3));
            }
            BuildStatus::Merging => std::thread::sleep(std::time::Duration::from_millis(1)),
            BuildStatus::Done(report) => break report,
        }
    };
    drop(task);

    assert_eq!(ticks, 3);
    assert_eq!(report.indexed, 3);
    let events: Vec<ProgressEvent> = rx.try_iter().collect();
    assert!(events.len() >= 4);
    assert_eq!(events[0].message, "Assets/A.txt");
    assert!(events.last().is_some_and(|e| e.finished));
    assert!(engine.is_ready());
    Ok(())
}
