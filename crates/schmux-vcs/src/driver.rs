//! The VCS Driver: shells out to `git` for every read and write.
//!
//! Output parsing is concentrated in this module; every other component
//! consumes the typed structs returned here, never raw command output —
//! grounded on `dk-engine::git::repository::GitRepository`'s split between
//! read and mutating operations, collapsed onto a single shelled-out `git`
//! surface since schmux has no long-lived in-process object database to
//! justify a second, `gix`-backed read path.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Per-call execution context: working directory, timeout, and a
/// cancellation token bound to the owning session/workspace's lifetime.
#[derive(Clone)]
pub struct CommandContext {
    pub cwd: PathBuf,
    pub timeout: Duration,
    pub cancellation: CancellationToken,
}

impl CommandContext {
    pub fn new(cwd: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            cwd: cwd.into(),
            timeout,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }
}

/// A single parsed commit, before graph-level annotation (branches,
/// is_head, workspace membership) is layered on by `schmux_vcs::graph`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCommit {
    pub hash: String,
    pub short_hash: String,
    pub subject: String,
    pub author: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub parents: Vec<String>,
}

/// Line-level diff summary used for workspace git-status polling.
#[derive(Debug, Clone, Default)]
pub struct DiffStat {
    pub files_changed: u32,
    pub lines_added: u64,
    pub lines_removed: u64,
}

const RECORD_SEP: &str = "\x1e";
const FIELD_SEP: &str = "\x1f";

/// Stateless driver over the `git` binary. Zero fields, mirroring
/// `ProcessExecutor` — every call is fully described by its `CommandContext`.
#[derive(Debug, Default, Clone, Copy)]
pub struct VcsDriver;

impl VcsDriver {
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, ctx: &CommandContext, args: &[&str]) -> Result<String> {
        if ctx.cancellation.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(&ctx.cwd);
        cmd.kill_on_drop(true);

        let output = tokio::select! {
            res = tokio::time::timeout(ctx.timeout, cmd.output()) => {
                match res {
                    Ok(Ok(output)) => output,
                    Ok(Err(err)) => return Err(Error::Io(err)),
                    Err(_) => return Err(Error::Timeout(ctx.timeout)),
                }
            }
            _ = ctx.cancellation.cancelled() => return Err(Error::Cancelled),
        };

        if !output.status.success() {
            return Err(Error::CommandFailed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    pub async fn clone_repo(&self, ctx: &CommandContext, url: &str, dest: &Path) -> Result<()> {
        self.run(
            ctx,
            &["clone", "--bare", url, dest.to_string_lossy().as_ref()],
        )
        .await?;
        Ok(())
    }

    pub async fn fetch(&self, ctx: &CommandContext) -> Result<()> {
        self.run(ctx, &["fetch", "--prune", "origin"]).await?;
        Ok(())
    }

    pub async fn worktree_add(
        &self,
        ctx: &CommandContext,
        dest: &Path,
        branch: &str,
        start_point: &str,
    ) -> Result<()> {
        self.run(
            ctx,
            &[
                "worktree",
                "add",
                "-B",
                branch,
                dest.to_string_lossy().as_ref(),
                start_point,
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn worktree_remove(&self, ctx: &CommandContext, path: &Path) -> Result<()> {
        let result = self
            .run(ctx, &["worktree", "remove", "--force", path.to_string_lossy().as_ref()])
            .await;
        if result.is_err() {
            // Fall back to a plain removal; `worktree remove` refuses when
            // the admin dir is already gone or the tree was hand-deleted.
            tokio::fs::remove_dir_all(path).await.ok();
        }
        Ok(())
    }

    pub async fn worktree_prune(&self, ctx: &CommandContext) -> Result<()> {
        self.run(ctx, &["worktree", "prune"]).await?;
        Ok(())
    }

    pub async fn current_branch(&self, ctx: &CommandContext) -> Result<String> {
        let out = self.run(ctx, &["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        Ok(out.trim().to_string())
    }

    pub async fn remote_branch_exists(&self, ctx: &CommandContext, branch: &str) -> Result<bool> {
        Ok(self
            .run(ctx, &["rev-parse", "--verify", &format!("origin/{branch}")])
            .await
            .is_ok())
    }

    pub async fn local_branch_exists(&self, ctx: &CommandContext, branch: &str) -> Result<bool> {
        Ok(self
            .run(ctx, &["show-ref", "--verify", "--quiet", &format!("refs/heads/{branch}")])
            .await
            .is_ok())
    }

    pub async fn checkout_branch(
        &self,
        ctx: &CommandContext,
        branch: &str,
        reset_to: Option<&str>,
    ) -> Result<()> {
        match reset_to {
            Some(start_point) => {
                self.run(ctx, &["checkout", "-B", branch, start_point]).await?;
            }
            None => {
                self.run(ctx, &["checkout", "-B", branch]).await?;
            }
        }
        Ok(())
    }

    pub async fn checkout_discard_all(&self, ctx: &CommandContext) -> Result<()> {
        self.run(ctx, &["checkout", "--", "."]).await.ok();
        self.run(ctx, &["reset", "--hard", "HEAD"]).await?;
        Ok(())
    }

    pub async fn clean_untracked(&self, ctx: &CommandContext) -> Result<()> {
        self.run(ctx, &["clean", "-fd"]).await?;
        Ok(())
    }

    pub async fn pull_rebase(&self, ctx: &CommandContext, branch: &str) -> Result<()> {
        self.run(ctx, &["pull", "--rebase", "origin", branch]).await?;
        Ok(())
    }

    pub async fn rev_list_count(&self, ctx: &CommandContext, range: &str) -> Result<u32> {
        let out = self.run(ctx, &["rev-list", "--count", range]).await?;
        out.trim()
            .parse()
            .map_err(|_| Error::ParseError(format!("not a count: {out:?}")))
    }

    pub async fn merge_base(&self, ctx: &CommandContext, a: &str, b: &str) -> Result<Option<String>> {
        match self.run(ctx, &["merge-base", a, b]).await {
            Ok(out) => Ok(Some(out.trim().to_string())),
            Err(Error::CommandFailed { .. }) => Ok(None),
            Err(other) => Err(other),
        }
    }

    pub async fn is_ancestor(&self, ctx: &CommandContext, maybe_ancestor: &str, descendant: &str) -> Result<bool> {
        Ok(self
            .run(ctx, &["merge-base", "--is-ancestor", maybe_ancestor, descendant])
            .await
            .is_ok())
    }

    pub async fn show_ref_exists(&self, ctx: &CommandContext, reference: &str) -> Result<bool> {
        Ok(self
            .run(ctx, &["show-ref", "--verify", "--quiet", reference])
            .await
            .is_ok())
    }

    /// Resolve `reference` to its full commit hash, or `None` if it doesn't
    /// exist. Used by `schmux_vcs::graph` to pin the graph's head node to
    /// the actually-resolved branch tip instead of guessing from log order.
    pub async fn resolve_ref(&self, ctx: &CommandContext, reference: &str) -> Result<Option<String>> {
        match self.run(ctx, &["rev-parse", "--verify", reference]).await {
            Ok(out) => Ok(Some(out.trim().to_string())),
            Err(Error::CommandFailed { .. }) => Ok(None),
            Err(other) => Err(other),
        }
    }

    /// Resolve the repo's default branch via the `origin/HEAD` symbolic
    /// ref, matching the assumption the rest of this crate already makes
    /// about `origin/HEAD` being set up after a fetch. Falls back to
    /// `"main"` when no such ref exists (e.g. a base repo that hasn't
    /// fetched yet).
    pub async fn default_branch(&self, ctx: &CommandContext) -> Result<String> {
        match self
            .run(ctx, &["symbolic-ref", "--short", "refs/remotes/origin/HEAD"])
            .await
        {
            Ok(out) => {
                let trimmed = out.trim();
                Ok(trimmed.strip_prefix("origin/").unwrap_or(trimmed).to_string())
            }
            Err(_) => Ok("main".to_string()),
        }
    }

    /// Whether `relpath` (relative to `ctx.cwd`) would be ignored by the
    /// workspace's own `.gitignore`. Overlay content is only ever copied
    /// into paths that satisfy this check — see SPEC_FULL.md §4.5.
    pub async fn is_ignored(&self, ctx: &CommandContext, relpath: &str) -> Result<bool> {
        match self.run(ctx, &["check-ignore", "-q", relpath]).await {
            Ok(_) => Ok(true),
            Err(Error::CommandFailed { code: Some(1), .. }) => Ok(false),
            Err(other) => Err(other),
        }
    }

    /// `git log` over the given starting refs, topo-ordered, bounded to
    /// `max_count`, parsed via a field/record separator format string so no
    /// downstream component ever has to scrape `git log`'s human format.
    pub async fn log_topo_order(
        &self,
        ctx: &CommandContext,
        refs: &[String],
        max_count: u32,
    ) -> Result<Vec<RawCommit>> {
        let format = format!("--pretty=format:%H{FIELD_SEP}%h{FIELD_SEP}%s{FIELD_SEP}%an{FIELD_SEP}%aI{FIELD_SEP}%P{RECORD_SEP}");
        let max_count_arg = format!("--max-count={max_count}");
        let mut args = vec!["log", "--topo-order", &format, &max_count_arg];
        for r in refs {
            args.push(r.as_str());
        }
        let out = self.run(ctx, &args).await?;
        parse_log_output(&out)
    }

    /// `git diff --numstat` against `base` for the working tree.
    pub async fn diff_numstat(&self, ctx: &CommandContext, base: &str) -> Result<DiffStat> {
        let out = self.run(ctx, &["diff", "--numstat", base]).await?;
        let mut stat = DiffStat::default();
        for line in out.lines() {
            let mut parts = line.split_whitespace();
            let added = parts.next().unwrap_or("0");
            let removed = parts.next().unwrap_or("0");
            if parts.next().is_none() {
                continue;
            }
            stat.files_changed += 1;
            stat.lines_added += added.parse::<u64>().unwrap_or(0);
            stat.lines_removed += removed.parse::<u64>().unwrap_or(0);
        }
        Ok(stat)
    }

    /// Count of untracked, non-ignored files (`git status --porcelain`).
    pub async fn untracked_files(&self, ctx: &CommandContext) -> Result<Vec<String>> {
        let out = self
            .run(ctx, &["status", "--porcelain", "--untracked-files=all"])
            .await?;
        Ok(out
            .lines()
            .filter(|l| l.starts_with("??"))
            .filter_map(|l| l.get(3..).map(str::to_string))
            .collect())
    }

    /// Any tracked-file modifications in the working tree (dirty check).
    pub async fn has_tracked_changes(&self, ctx: &CommandContext) -> Result<bool> {
        let out = self.run(ctx, &["status", "--porcelain"]).await?;
        Ok(out.lines().any(|l| !l.starts_with("??")))
    }
}

fn parse_log_output(raw: &str) -> Result<Vec<RawCommit>> {
    let mut commits = Vec::new();
    for record in raw.split(RECORD_SEP) {
        let record = record.trim_matches('\n');
        if record.is_empty() {
            continue;
        }
        let fields: Vec<&str> = record.split(FIELD_SEP).collect();
        let [hash, short_hash, subject, author, ts, parents] = fields[..] else {
            return Err(Error::ParseError(format!("malformed log record: {record:?}")));
        };
        let timestamp = chrono::DateTime::parse_from_rfc3339(ts)
            .map_err(|e| Error::ParseError(format!("bad timestamp {ts:?}: {e}")))?
            .with_timezone(&chrono::Utc);
        commits.push(RawCommit {
            hash: hash.to_string(),
            short_hash: short_hash.to_string(),
            subject: subject.to_string(),
            author: author.to_string(),
            timestamp,
            parents: parents.split_whitespace().map(str::to_string).collect(),
        });
    }
    Ok(commits)
}
