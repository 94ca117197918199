use super::*;
use crate::ids::{RunId, TaskId};

#[test]
fn run_branch_name_follows_the_agent_contract() {
    let repo = Repository::new("https://example.com/org/my-repo.git", "main", "/var/cache/oj/repo");
    let task_id = TaskId::new();
    let run_id = RunId::new();
    let branch = repo.run_branch_name(&task_id, &run_id);
    assert!(branch.starts_with("agent/my-repo/"));
    assert!(branch.contains(task_id.suffix()));
    assert!(branch.ends_with(run_id.as_str()));
    assert!(validate_branch_name(&branch, &run_id));
}

#[test]
fn validate_branch_name_rejects_wrong_first_segment() {
    let run_id = RunId::new();
    let branch = format!("other/my-repo/task123/{run_id}");
    assert!(!validate_branch_name(&branch, &run_id));
}

#[test]
fn validate_branch_name_is_case_insensitive_on_fixed_segments() {
    let run_id = RunId::new();
    let branch = format!("AGENT/my-repo/task123/{}", run_id.as_str().to_ascii_uppercase());
    assert!(validate_branch_name(&branch, &run_id));
}

#[test]
fn validate_branch_name_requires_four_segments() {
    let run_id = RunId::new();
    let branch = format!("agent/{run_id}");
    assert!(!validate_branch_name(&branch, &run_id));
}

#[test]
fn validate_branch_name_rejects_wrong_run_id() {
    let run_id = RunId::new();
    let other = RunId::new();
    let branch = format!("agent/my-repo/task123/{other}");
    assert!(!validate_branch_name(&branch, &run_id));
}

#[test]
fn repository_new_starts_unsynced() {
    let repo = Repository::new("https://example.com/org/repo.git", "main", "/var/cache/oj/repo");
    assert!(repo.last_synced_at_ms.is_none());
    assert_eq!(repo.default_branch, "main");
}

#[test]
fn short_name_strips_git_suffix_and_path() {
    let repo = Repository::new("git@github.com:org/my-repo.git", "main", "/cache");
    let task_id = TaskId::new();
    let run_id = RunId::new();
    let branch = repo.run_branch_name(&task_id, &run_id);
    assert!(branch.starts_with("agent/my-repo/"));
}
