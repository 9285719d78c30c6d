//! Gateway method names. Proxies call `request(<name>, params)` with these.

pub const HEALTH: &str = "health";
pub const STATUS: &str = "status";

pub const CONFIG_GET: &str = "config.get";
pub const CONFIG_SET: &str = "config.set";
pub const CONFIG_PATCH: &str = "config.patch";
pub const CONFIG_SCHEMA: &str = "config.schema";

pub const MODELS_LIST: &str = "models.list";

pub const SESSIONS_LIST: &str = "sessions.list";
pub const SESSIONS_DELETE: &str = "sessions.delete";
pub const SESSIONS_COMPACT: &str = "sessions.compact";
pub const SESSIONS_PREVIEW: &str = "sessions.preview";
pub const SESSIONS_PATCH: &str = "sessions.patch";
pub const SESSIONS_RESET: &str = "sessions.reset";
pub const SESSIONS_SPAWN: &str = "sessions.spawn";
pub const SESSIONS_TRANSCRIPT: &str = "sessions.transcript";

pub const SKILLS_STATUS: &str = "skills.status";
pub const SKILLS_BINS: &str = "skills.bins";
pub const SKILLS_INSTALL: &str = "skills.install";
pub const SKILLS_UPDATE: &str = "skills.update";

pub const CRON_LIST: &str = "cron.list";
pub const CRON_STATUS: &str = "cron.status";
pub const CRON_ADD: &str = "cron.add";
pub const CRON_REMOVE: &str = "cron.remove";
pub const CRON_RUN: &str = "cron.run";
pub const CRON_RUNS: &str = "cron.runs";

pub const VOICEWAKE_GET: &str = "voicewake.get";
pub const VOICEWAKE_SET: &str = "voicewake.set";

pub const WIZARD_START: &str = "wizard.start";
pub const WIZARD_NEXT: &str = "wizard.next";
pub const WIZARD_CANCEL: &str = "wizard.cancel";
pub const WIZARD_STATUS: &str = "wizard.status";

pub const EXEC_APPROVALS_GET: &str = "exec.approvals.get";
pub const EXEC_APPROVALS_SET: &str = "exec.approvals.set";
pub const EXEC_APPROVALS_RESOLVE: &str = "exec.approvals.resolve";
pub const EXEC_BASH: &str = "exec.bash";

pub const USAGE_STATUS: &str = "usage.status";
pub const USAGE_COST: &str = "usage.cost";

pub const LOGS_TAIL: &str = "logs.tail";
