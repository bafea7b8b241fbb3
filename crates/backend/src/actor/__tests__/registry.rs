//! ProjectRegistry scenarios: window association, pruning and event routing.

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;
  use tagscope_core::config::FolderEntry;

  use crate::{
    actor::{
      __tests__::helpers::{RecordingBackend, TestHost, TestProject, new_registry, wait_idle, wait_status},
      indexer::{IndexMode, TWO_TIER_THRESHOLD},
      runtime::ActorState,
    },
    domain::project::placeholder_project_file,
    editor::{EditorHost, WindowInfo},
  };

  #[test]
  fn test_windows_share_project_indexer() {
    let project = TestProject::new("shared");
    project.write_c_files("lib", "f", 3);

    let host = TestHost::new();
    let backend = RecordingBackend::new();
    let mut registry = new_registry(&host, &backend);

    host.open_project(1, &project);
    host.open_project(2, &project);
    registry.window_state_changed();

    let first = registry.indexer_for_window(1).unwrap().clone();
    let second = registry.indexer_for_window(2).unwrap().clone();
    assert!(first.same_actor(&second));
    assert_eq!(registry.projects().count(), 1);
    assert_eq!(registry.windows_of(&project.project_file), vec![1, 2]);
    let status = wait_status(&first, |s| s.generations > 0);
    assert_eq!(status.crawls_dispatched, 1);

    host.close(1);
    registry.window_state_changed();
    assert_eq!(registry.windows_of(&project.project_file), vec![2]);
    assert_eq!(first.state(), ActorState::Running);

    host.close(2);
    registry.window_state_changed();
    assert_eq!(registry.projects().count(), 0);
    assert!(registry.indexer_for_window(2).is_none());
    assert_eq!(first.state(), ActorState::Stopped);
  }

  #[test]
  fn test_window_without_folders_has_no_project() {
    let host = TestHost::new();
    let backend = RecordingBackend::new();
    let mut registry = new_registry(&host, &backend);

    host.open(WindowInfo::new(5));
    registry.window_state_changed();

    assert_eq!(registry.projects().count(), 0);
    assert!(registry.project_of(5).is_none());
  }

  #[test]
  fn test_window_without_project_file_gets_placeholder() {
    let project = TestProject::new("unused");
    project.write_c_files("lib", "f", 2);

    let host = TestHost::new();
    let backend = RecordingBackend::new();
    let mut registry = new_registry(&host, &backend);

    host.open(WindowInfo {
      folders: vec![FolderEntry::new(&project.src)],
      ..WindowInfo::new(9)
    });
    registry.refresh(Some(9), false);

    let placeholder = placeholder_project_file(&host.cache_dir(), 9);
    assert_eq!(registry.project_of(9), Some(placeholder.as_path()));
    assert!(placeholder.parent().unwrap().is_dir());

    let indexer = registry.indexer_for_window(9).unwrap().clone();
    let status = wait_status(&indexer, |s| s.generations > 0);
    assert_eq!(status.files, 2);
    assert!(
      placeholder
        .parent()
        .unwrap()
        .join("dummy_project-tagscope")
        .join("primary.files")
        .is_file()
    );
  }

  #[test]
  fn test_window_switching_projects_moves_association() {
    let old = TestProject::new("old");
    old.write_c_files("lib", "f", 2);
    let new = TestProject::new("new");
    new.write_c_files("lib", "g", 2);

    let host = TestHost::new();
    let backend = RecordingBackend::new();
    let mut registry = new_registry(&host, &backend);

    host.open_project(1, &old);
    registry.window_state_changed();
    let old_indexer = registry.indexer_for_window(1).unwrap().clone();

    host.open_project(1, &new);
    registry.window_state_changed();

    assert_eq!(registry.project_of(1), Some(new.project_file.as_path()));
    assert!(registry.indexer_for_project(&old.project_file).is_none());
    assert_eq!(old_indexer.state(), ActorState::Stopped);
  }

  #[test]
  fn test_explicit_refresh_recrawls_unchanged_project() {
    let project = TestProject::new("explicit");
    project.write_c_files("lib", "f", 2);

    let host = TestHost::new();
    let backend = RecordingBackend::new();
    let mut registry = new_registry(&host, &backend);

    host.open_project(1, &project);
    registry.refresh(Some(1), true);
    let indexer = registry.indexer_for_window(1).unwrap().clone();
    let first = wait_idle(&indexer);
    // A new config already crawls; the explicit request is downgraded
    assert_eq!(first.crawls_dispatched, 1);

    registry.refresh(Some(1), false);
    assert_eq!(wait_idle(&indexer).crawls_dispatched, 1);

    registry.refresh(Some(1), true);
    assert_eq!(wait_status(&indexer, |s| s.crawls_dispatched == 2).crawls_completed, 2);
  }

  #[test]
  fn test_saved_project_file_reevaluates_settings() {
    let project = TestProject::new("settings");
    project.write_c_files("lib", "f", 2);
    project.write_file("lib/script.py", "print()\n");
    project.write_file("lib/tool.rs", "fn main() {}\n");

    let host = TestHost::new();
    let backend = RecordingBackend::new();
    let mut registry = new_registry(&host, &backend);

    host.open_project(1, &project);
    registry.window_state_changed();
    let indexer = registry.indexer_for_window(1).unwrap().clone();
    assert_eq!(wait_status(&indexer, |s| s.generations > 0).files, 3);
    let before = registry.config_for_project(&project.project_file).unwrap();

    host.update(1, |w| w.settings.index_file_extensions = Some(vec![".rs".to_string()]));
    registry.buffer_promoted(&project.project_file);

    let after = registry.config_for_project(&project.project_file).unwrap();
    assert_ne!(*before, *after);
    let status = wait_status(&indexer, |s| s.files == 1);
    assert_eq!(indexer.file_list().unwrap(), vec![project.path("lib/tool.rs")]);
    assert_eq!(status.mode, IndexMode::OneTier);

    // Closing the project file is not a buffer demotion
    registry.buffer_demoted(&project.project_file);
    assert_eq!(wait_idle(&indexer).demoted, 0);
  }

  #[test]
  fn test_settings_changed_for_unknown_project_refreshes_windows() {
    let project = TestProject::new("known");
    project.write_c_files("lib", "f", 2);
    let late = TestProject::new("late");
    late.write_c_files("lib", "g", 1);

    let host = TestHost::new();
    let backend = RecordingBackend::new();
    let mut registry = new_registry(&host, &backend);

    host.open_project(1, &project);
    registry.window_state_changed();
    let indexer = registry.indexer_for_window(1).unwrap().clone();
    let before = wait_idle(&indexer);

    // Opened without a window event; the unknown project's change finds it
    host.open_project(2, &late);
    registry.settings_changed(Some(late.project_file.as_path()));
    let late_indexer = registry.indexer_for_window(2).unwrap().clone();
    assert_eq!(wait_status(&late_indexer, |s| s.generations > 0).files, 1);

    registry.settings_changed(Some(project.project_file.as_path()));
    assert_eq!(wait_idle(&indexer).crawls_dispatched, before.crawls_dispatched);
    assert!(!late_indexer.same_actor(&indexer));
  }

  #[test]
  fn test_buffer_events_reach_project_indexer() {
    let project = TestProject::new("routed");
    let files = project.write_c_files("lib", "f", TWO_TIER_THRESHOLD + 1);
    let unrelated = TestProject::new("unrelated");
    unrelated.write_c_files("lib", "u", 1);

    let host = TestHost::new();
    let backend = RecordingBackend::new();
    let mut registry = new_registry(&host, &backend);

    host.open_project(1, &project);
    host.open_project(2, &unrelated);
    registry.window_state_changed();
    let indexer = registry.indexer_for_window(1).unwrap().clone();
    let other = registry.indexer_for_window(2).unwrap().clone();
    wait_status(&indexer, |s| s.mode == IndexMode::TwoTier);

    registry.buffer_promoted(&files[0]);
    assert_eq!(wait_status(&indexer, |s| s.promoted == 1).promoted, 1);
    assert_eq!(wait_idle(&other).promoted, 0);

    registry.buffer_demoted(&files[0]);
    wait_idle(&indexer);
  }

  #[test]
  fn test_quit_stops_every_indexer() {
    let first = TestProject::new("first");
    let second = TestProject::new("second");

    let host = TestHost::new();
    let backend = RecordingBackend::new();
    let mut registry = new_registry(&host, &backend);

    host.open_project(1, &first);
    host.open_project(2, &second);
    registry.window_state_changed();
    let indexers: Vec<_> = [1, 2]
      .iter()
      .map(|id| registry.indexer_for_window(*id).unwrap().clone())
      .collect();

    registry.quit();

    assert_eq!(registry.projects().count(), 0);
    for indexer in indexers {
      assert_eq!(indexer.state(), ActorState::Stopped);
    }
  }
}
