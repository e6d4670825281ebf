//! Commit graph computation: the divergence-focused, topologically sorted
//! view described in SPEC_FULL.md §4.3 step 6. No teacher module computes a
//! commit DAG (the only graph type in the teacher, `session_graph.rs`, is a
//! symbol delta-graph) — this is built fresh against the driver's own
//! `log_topo_order`/`merge_base`/`rev_list_count` primitives.

use std::collections::{HashMap, HashSet, VecDeque};

use schmux_core::types::{BranchInfo, CommitGraph, CommitNode, WorkspaceId};

use crate::driver::{CommandContext, RawCommit, VcsDriver};
use crate::error::Result;

pub struct GraphOptions {
    pub max_total: u32,
    pub main_context: u32,
    pub max_local: u32,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            max_total: 200,
            main_context: 20,
            max_local: 100,
        }
    }
}

/// Compute the commit graph for a single workspace relative to its repo's
/// default branch. `workspace_id` is stamped onto every returned node whose
/// commit is reachable from `local_head`, so callers can merge graphs across
/// workspaces sharing a repo.
pub async fn compute_commit_graph(
    driver: &VcsDriver,
    ctx: &CommandContext,
    workspace_id: &WorkspaceId,
    local_branch: &str,
    default_branch: &str,
    opts: &GraphOptions,
) -> Result<CommitGraph> {
    let local_head = format!("refs/heads/{local_branch}");
    let origin_main = format!("refs/remotes/origin/{default_branch}");

    let local_head_hash = driver.resolve_ref(ctx, &local_head).await?;

    let origin_main_exists = driver.show_ref_exists(ctx, &origin_main).await?;
    if !origin_main_exists {
        let commits = driver
            .log_topo_order(ctx, &[local_head.clone()], opts.max_local)
            .await?;
        return Ok(build_graph(
            commits,
            workspace_id,
            local_branch,
            default_branch,
            None,
            0,
            local_head_hash,
            opts,
        ));
    }

    let local_resolved = driver.is_ancestor(ctx, &origin_main, &local_head).await?
        && driver.is_ancestor(ctx, &local_head, &origin_main).await?;
    if local_resolved {
        let commits = driver
            .log_topo_order(ctx, &[local_head.clone()], opts.max_local)
            .await?;
        return Ok(build_graph(
            commits,
            workspace_id,
            local_branch,
            default_branch,
            None,
            0,
            local_head_hash,
            opts,
        ));
    }

    let fork_point = driver.merge_base(ctx, &local_head, &origin_main).await?;
    let main_ahead_count = driver
        .rev_list_count(ctx, &format!("{local_head}..{origin_main}"))
        .await
        .unwrap_or(0);

    let mut local_commits = driver
        .log_topo_order(ctx, &[local_head.clone()], opts.max_local)
        .await?;

    let mut historical = if let Some(fp) = &fork_point {
        driver
            .log_topo_order(ctx, &[fp.clone()], opts.main_context)
            .await
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    if let Some(fp) = &fork_point {
        if !local_commits.iter().any(|c| &c.hash == fp) && !historical.iter().any(|c| &c.hash == fp) {
            if let Ok(mut extra) = driver.log_topo_order(ctx, &[fp.clone()], 1).await {
                historical.append(&mut extra);
            }
        }
    }

    local_commits.append(&mut historical);

    Ok(build_graph(
        local_commits,
        workspace_id,
        local_branch,
        default_branch,
        fork_point.as_deref(),
        main_ahead_count,
        local_head_hash,
        opts,
    ))
}

#[allow(clippy::too_many_arguments)]
fn build_graph(
    commits: Vec<RawCommit>,
    workspace_id: &WorkspaceId,
    local_branch: &str,
    default_branch: &str,
    fork_point: Option<&str>,
    main_ahead_count: u32,
    local_head_hash: Option<String>,
    opts: &GraphOptions,
) -> CommitGraph {
    let mut by_hash: HashMap<String, RawCommit> = HashMap::new();
    for c in commits {
        by_hash.entry(c.hash.clone()).or_insert(c);
    }

    // Membership: "on local" = reachable by walking parents from the local
    // head within the fetched set; "on default" = everything else we know
    // about up to (and including) the fork point. The head hash comes from
    // an explicit `git rev-parse`, never from `by_hash`'s iteration order
    // (a `HashMap` makes no ordering guarantee at all).
    let local_head_hash = local_head_hash.filter(|h| by_hash.contains_key(h));

    let mut on_local: HashSet<String> = HashSet::new();
    if let Some(start) = &local_head_hash {
        walk_reachable(&by_hash, start, &mut on_local);
    } else if let Some(first) = by_hash.keys().next().cloned() {
        walk_reachable(&by_hash, &first, &mut on_local);
    }

    let ordered = topo_sort(&by_hash, &on_local, fork_point);

    let mut nodes: Vec<CommitNode> = ordered
        .into_iter()
        .take(opts.max_total as usize)
        .map(|hash| {
            let raw = by_hash.get(&hash).expect("hash came from by_hash keys");
            let is_on_local = on_local.contains(&hash);
            let mut branches = Vec::new();
            let mut is_head = Vec::new();
            if is_on_local {
                branches.push(local_branch.to_string());
            }
            if Some(hash.as_str()) == fork_point {
                branches.push(default_branch.to_string());
            }
            if local_head_hash.as_deref() == Some(hash.as_str()) {
                is_head.push(local_branch.to_string());
            }
            CommitNode {
                hash: raw.hash.clone(),
                short_hash: raw.short_hash.clone(),
                subject: raw.subject.clone(),
                author: raw.author.clone(),
                timestamp: raw.timestamp,
                parents: raw.parents.clone(),
                branches,
                is_head,
                workspace_ids: if is_on_local { vec![workspace_id.clone()] } else { Vec::new() },
            }
        })
        .collect();

    // Heads-first render order.
    nodes.reverse();

    let mut branches = HashMap::new();
    if let Some(head) = &local_head_hash {
        branches.insert(
            local_branch.to_string(),
            BranchInfo {
                is_main: false,
                tip: head.clone(),
            },
        );
    }
    if let Some(fp) = fork_point {
        branches.insert(
            default_branch.to_string(),
            BranchInfo {
                is_main: true,
                tip: fp.to_string(),
            },
        );
    }

    CommitGraph {
        nodes,
        branches,
        main_ahead_count,
    }
}

fn walk_reachable(by_hash: &HashMap<String, RawCommit>, start: &str, out: &mut HashSet<String>) {
    let mut queue = VecDeque::new();
    queue.push_back(start.to_string());
    while let Some(hash) = queue.pop_front() {
        if !out.insert(hash.clone()) {
            continue;
        }
        if let Some(commit) = by_hash.get(&hash) {
            for parent in &commit.parents {
                if by_hash.contains_key(parent) {
                    queue.push_back(parent.clone());
                }
            }
        }
    }
}

/// ISL-style DFS topological sort: push roots, pop from the back; a node
/// with unvisited parents still pending is deferred to the front so a merge
/// commit is only emitted once both of its parents have been. Ties break:
/// draft (on local, not on default) before public, older timestamp before
/// newer, then hash lexicographic.
fn topo_sort(
    by_hash: &HashMap<String, RawCommit>,
    on_local: &HashSet<String>,
    fork_point: Option<&str>,
) -> Vec<String> {
    let mut indegree: HashMap<&str, usize> = HashMap::new();
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    for (hash, commit) in by_hash {
        indegree.entry(hash.as_str()).or_insert(0);
        for parent in &commit.parents {
            if by_hash.contains_key(parent) {
                *indegree.entry(hash.as_str()).or_insert(0) += 1;
                children.entry(parent.as_str()).or_default().push(hash.as_str());
            }
        }
    }

    let mut roots: Vec<&str> = indegree
        .iter()
        .filter(|(_, &count)| count == 0)
        .map(|(h, _)| *h)
        .collect();
    sort_candidates(&mut roots, by_hash, on_local, fork_point);

    let mut deque: VecDeque<&str> = roots.into();
    let mut order = Vec::new();
    let mut remaining = indegree.clone();

    while let Some(node) = deque.pop_back() {
        order.push(node.to_string());
        if let Some(kids) = children.get(node) {
            let mut ready = Vec::new();
            for &child in kids {
                let count = remaining.get_mut(child).unwrap();
                *count -= 1;
                if *count == 0 {
                    ready.push(child);
                }
            }
            sort_candidates(&mut ready, by_hash, on_local, fork_point);
            for r in ready {
                deque.push_front(r);
            }
        }
    }

    order
}

fn sort_candidates<'a>(
    candidates: &mut [&'a str],
    by_hash: &HashMap<String, RawCommit>,
    on_local: &HashSet<String>,
    fork_point: Option<&str>,
) {
    candidates.sort_by(|a, b| {
        let a_draft = on_local.contains(*a) && Some(*a) != fork_point;
        let b_draft = on_local.contains(*b) && Some(*b) != fork_point;
        b_draft
            .cmp(&a_draft)
            .then_with(|| {
                let ta = by_hash.get(*a).map(|c| c.timestamp);
                let tb = by_hash.get(*b).map(|c| c.timestamp);
                ta.cmp(&tb)
            })
            .then_with(|| b.cmp(a))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    fn git(dir: &std::path::Path, args: &[&str]) {
        let status = std::process::Command::new("git")
            .args(args)
            .current_dir(dir)
            .status()
            .unwrap();
        assert!(status.success(), "git {args:?} failed in {}", dir.display());
    }

    fn commit(hash: &str, parents: &[&str], ts: i64) -> RawCommit {
        RawCommit {
            hash: hash.to_string(),
            short_hash: hash[..7.min(hash.len())].to_string(),
            subject: format!("commit {hash}"),
            author: "tester".to_string(),
            timestamp: chrono::DateTime::from_timestamp(ts, 0).unwrap(),
            parents: parents.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn topo_sort_respects_parent_child_edges() {
        let commits = vec![commit("c3", &["c2"], 3), commit("c2", &["c1"], 2), commit("c1", &[], 1)];
        let mut by_hash = HashMap::new();
        for c in commits {
            by_hash.insert(c.hash.clone(), c);
        }
        let on_local: HashSet<String> = by_hash.keys().cloned().collect();
        let order = topo_sort(&by_hash, &on_local, None);

        let pos = |h: &str| order.iter().position(|x| x == h).unwrap();
        assert!(pos("c3") < pos("c2"));
        assert!(pos("c2") < pos("c1"));
    }

    #[test]
    fn build_graph_marks_head_from_resolved_hash_not_insertion_order() {
        // Insertion order here deliberately does not match the true head
        // ("c1" is inserted last) to prove the head annotation comes from
        // the explicitly resolved hash, not from `HashMap` iteration.
        let commits = vec![commit("c3", &["c2"], 3), commit("c2", &["c1"], 2), commit("c1", &[], 1)];
        let workspace_id = "ws-1".to_string();
        let graph = build_graph(
            commits,
            &workspace_id,
            "feature",
            "main",
            None,
            0,
            Some("c3".to_string()),
            &GraphOptions::default(),
        );
        let head_node = graph.nodes.iter().find(|n| n.hash == "c3").unwrap();
        assert_eq!(head_node.is_head, vec!["feature".to_string()]);
        let non_head = graph.nodes.iter().find(|n| n.hash == "c1").unwrap();
        assert!(non_head.is_head.is_empty());
    }

    #[test]
    fn topo_sort_orders_merge_after_both_parents() {
        let commits = vec![
            commit("merge", &["a", "b"], 10),
            commit("a", &["base"], 5),
            commit("b", &["base"], 6),
            commit("base", &[], 1),
        ];
        let mut by_hash = HashMap::new();
        for c in commits {
            by_hash.insert(c.hash.clone(), c);
        }
        let on_local: HashSet<String> = by_hash.keys().cloned().collect();
        let order = topo_sort(&by_hash, &on_local, None);

        let pos = |h: &str| order.iter().position(|x| x == h).unwrap();
        assert!(pos("merge") < pos("a"));
        assert!(pos("merge") < pos("b"));
        assert!(pos("a") < pos("base"));
        assert!(pos("b") < pos("base"));
    }

    /// Real-git integration test for the divergence scenario: local `feature`
    /// branch has 3 local commits, `origin/main` has 2 commits since the fork
    /// point. Checks `main_ahead_count`, the fork point being the only shared
    /// node, and `branches["main"].is_main`.
    #[tokio::test]
    async fn compute_commit_graph_reports_divergence_from_origin_main() {
        let root = tempfile::tempdir().unwrap();
        let origin_dir = root.path().join("origin");
        std::fs::create_dir_all(&origin_dir).unwrap();
        git(&origin_dir, &["init", "-q", "-b", "main"]);
        git(&origin_dir, &["config", "user.email", "a@b.c"]);
        git(&origin_dir, &["config", "user.name", "Test"]);
        std::fs::write(origin_dir.join("README.md"), b"hello\n").unwrap();
        git(&origin_dir, &["add", "-A"]);
        git(&origin_dir, &["commit", "-q", "-m", "init"]);

        let clone_dir = root.path().join("clone");
        git(
            root.path(),
            &["clone", "-q", origin_dir.to_str().unwrap(), clone_dir.to_str().unwrap()],
        );
        git(&clone_dir, &["config", "user.email", "a@b.c"]);
        git(&clone_dir, &["config", "user.name", "Test"]);
        git(&clone_dir, &["checkout", "-q", "-b", "feature"]);

        for i in 0..3 {
            std::fs::write(clone_dir.join(format!("local-{i}.txt")), b"wip\n").unwrap();
            git(&clone_dir, &["add", "-A"]);
            git(&clone_dir, &["commit", "-q", "-m", &format!("local commit {i}")]);
        }

        for i in 0..2 {
            std::fs::write(origin_dir.join(format!("main-{i}.txt")), b"upstream\n").unwrap();
            git(&origin_dir, &["add", "-A"]);
            git(&origin_dir, &["commit", "-q", "-m", &format!("main commit {i}")]);
        }
        git(&clone_dir, &["fetch", "-q", "origin"]);

        let driver = VcsDriver::new();
        let ctx = CommandContext::new(&clone_dir, StdDuration::from_secs(5));
        let workspace_id = "ws-divergence".to_string();
        let graph = compute_commit_graph(&driver, &ctx, &workspace_id, "feature", "main", &GraphOptions::default())
            .await
            .unwrap();

        assert_eq!(graph.main_ahead_count, 2);
        let local_subjects: Vec<&str> = graph.nodes.iter().map(|n| n.subject.as_str()).collect();
        assert!(local_subjects.iter().any(|s| s.contains("local commit 0")));
        assert!(local_subjects.iter().any(|s| s.contains("local commit 2")));
        assert!(!local_subjects.iter().any(|s| s.contains("main commit 1")));

        for i in 0..local_subjects.len() {
            for j in 0..local_subjects.len() {
                let child_is_parent_of_later = graph.nodes[i].parents.contains(&graph.nodes[j].hash);
                if child_is_parent_of_later {
                    assert!(i < j, "child {i} must come before its parent {j}");
                }
            }
        }

        let main_branch = graph.branches.get("main").expect("main branch entry present");
        assert!(main_branch.is_main);
        assert!(graph.branches.contains_key("feature"));
    }
}
