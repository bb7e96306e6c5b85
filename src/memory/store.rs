//! 持久化协作方
//!
//! 按实体划分的键值存取：执行历史（按记录 id）、会话（按会话 id）、唯一的当前 Agent 状态、
//! 用户偏好、按 provider 保存的认证令牌。实体之间不需要事务。
//!
//! 两个实现：
//! - [`InMemoryStore`]：进程内，测试与一次性运行用
//! - [`SqliteStore`]：rusqlite，单表 `records(bucket, key, payload)`，payload 为实体 JSON

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::StoreError;
use crate::memory::Conversation;
use crate::plan::Plan;
use crate::tools::ToolResult;

/// 单个步骤的一次执行记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionHistory {
    pub id: String,
    pub plan_id: String,
    pub step_id: String,
    pub timestamp: DateTime<Utc>,
    pub result: ToolResult,
    #[serde(default)]
    pub metadata: IndexMap<String, Value>,
}

impl ExecutionHistory {
    pub fn new(plan_id: impl Into<String>, step_id: impl Into<String>, result: ToolResult) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            plan_id: plan_id.into(),
            step_id: step_id.into(),
            timestamp: Utc::now(),
            result,
            metadata: IndexMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    Auto,
}

/// 用户偏好
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_sync: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analytics: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<Theme>,
}

/// 当前 Agent 状态（全局只有一条）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_plan: Option<Plan>,
    #[serde(default)]
    pub memory: IndexMap<String, Value>,
    #[serde(default)]
    pub preferences: UserPreferences,
}

/// 某个 provider 的认证令牌（由外部获取，这里只存取）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthToken {
    pub provider_id: String,
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scope: Vec<String>,
}

impl AuthToken {
    pub fn new(provider_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            token: token.into(),
            refresh_token: None,
            expires_at: None,
            scope: Vec::new(),
        }
    }

    /// 没有过期时间的令牌视为长期有效
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// 整库导出 / 导入格式
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryExport {
    #[serde(default)]
    pub task_log: Vec<ExecutionHistory>,
    #[serde(default)]
    pub chat_log: Vec<Conversation>,
    #[serde(default)]
    pub agent_state: AgentState,
    #[serde(default)]
    pub auth_tokens: Vec<AuthToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<UserPreferences>,
}

/// 持久化接口：每类实体只需 get / put
pub trait MemoryStore: Send + Sync {
    /// 追加执行记录（相同 id 覆盖）
    fn add_execution_history(&self, record: ExecutionHistory) -> Result<(), StoreError>;
    /// 执行记录（按写入顺序）；给定 plan_id 时只返回该计划的记录
    fn execution_history(&self, plan_id: Option<&str>) -> Result<Vec<ExecutionHistory>, StoreError>;
    fn execution_history_by_step(&self, step_id: &str) -> Result<Vec<ExecutionHistory>, StoreError>;

    fn put_conversation(&self, conversation: Conversation) -> Result<(), StoreError>;
    fn conversation(&self, id: &str) -> Result<Option<Conversation>, StoreError>;
    fn conversations(&self) -> Result<Vec<Conversation>, StoreError>;

    fn save_agent_state(&self, state: AgentState) -> Result<(), StoreError>;
    fn agent_state(&self) -> Result<Option<AgentState>, StoreError>;

    fn save_auth_token(&self, token: AuthToken) -> Result<(), StoreError>;
    fn auth_token(&self, provider_id: &str) -> Result<Option<AuthToken>, StoreError>;
    fn auth_tokens(&self) -> Result<Vec<AuthToken>, StoreError>;
    /// 删除令牌；返回是否存在过
    fn remove_auth_token(&self, provider_id: &str) -> Result<bool, StoreError>;

    fn save_preferences(&self, preferences: UserPreferences) -> Result<(), StoreError>;
    fn preferences(&self) -> Result<Option<UserPreferences>, StoreError>;

    /// 清空所有实体
    fn clear(&self) -> Result<(), StoreError>;

    fn export(&self) -> Result<MemoryExport, StoreError> {
        Ok(MemoryExport {
            task_log: self.execution_history(None)?,
            chat_log: self.conversations()?,
            agent_state: self.agent_state()?.unwrap_or_default(),
            auth_tokens: self.auth_tokens()?,
            preferences: self.preferences()?,
        })
    }

    /// 合并导入：同键覆盖，不删除已有数据
    fn import(&self, data: MemoryExport) -> Result<(), StoreError> {
        for record in data.task_log {
            self.add_execution_history(record)?;
        }
        for conversation in data.chat_log {
            self.put_conversation(conversation)?;
        }
        self.save_agent_state(data.agent_state)?;
        for token in data.auth_tokens {
            self.save_auth_token(token)?;
        }
        if let Some(preferences) = data.preferences {
            self.save_preferences(preferences)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// InMemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Inner {
    history: IndexMap<String, ExecutionHistory>,
    conversations: IndexMap<String, Conversation>,
    agent_state: Option<AgentState>,
    auth_tokens: IndexMap<String, AuthToken>,
    preferences: Option<UserPreferences>,
}

/// 进程内存储
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl MemoryStore for InMemoryStore {
    fn add_execution_history(&self, record: ExecutionHistory) -> Result<(), StoreError> {
        self.lock()?.history.insert(record.id.clone(), record);
        Ok(())
    }

    fn execution_history(&self, plan_id: Option<&str>) -> Result<Vec<ExecutionHistory>, StoreError> {
        Ok(self
            .lock()?
            .history
            .values()
            .filter(|h| plan_id.map_or(true, |p| h.plan_id == p))
            .cloned()
            .collect())
    }

    fn execution_history_by_step(&self, step_id: &str) -> Result<Vec<ExecutionHistory>, StoreError> {
        Ok(self
            .lock()?
            .history
            .values()
            .filter(|h| h.step_id == step_id)
            .cloned()
            .collect())
    }

    fn put_conversation(&self, conversation: Conversation) -> Result<(), StoreError> {
        self.lock()?
            .conversations
            .insert(conversation.id.clone(), conversation);
        Ok(())
    }

    fn conversation(&self, id: &str) -> Result<Option<Conversation>, StoreError> {
        Ok(self.lock()?.conversations.get(id).cloned())
    }

    fn conversations(&self) -> Result<Vec<Conversation>, StoreError> {
        Ok(self.lock()?.conversations.values().cloned().collect())
    }

    fn save_agent_state(&self, state: AgentState) -> Result<(), StoreError> {
        self.lock()?.agent_state = Some(state);
        Ok(())
    }

    fn agent_state(&self) -> Result<Option<AgentState>, StoreError> {
        Ok(self.lock()?.agent_state.clone())
    }

    fn save_auth_token(&self, token: AuthToken) -> Result<(), StoreError> {
        self.lock()?
            .auth_tokens
            .insert(token.provider_id.clone(), token);
        Ok(())
    }

    fn auth_token(&self, provider_id: &str) -> Result<Option<AuthToken>, StoreError> {
        Ok(self.lock()?.auth_tokens.get(provider_id).cloned())
    }

    fn auth_tokens(&self) -> Result<Vec<AuthToken>, StoreError> {
        Ok(self.lock()?.auth_tokens.values().cloned().collect())
    }

    fn remove_auth_token(&self, provider_id: &str) -> Result<bool, StoreError> {
        Ok(self.lock()?.auth_tokens.shift_remove(provider_id).is_some())
    }

    fn save_preferences(&self, preferences: UserPreferences) -> Result<(), StoreError> {
        self.lock()?.preferences = Some(preferences);
        Ok(())
    }

    fn preferences(&self) -> Result<Option<UserPreferences>, StoreError> {
        Ok(self.lock()?.preferences.clone())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.lock()? = Inner::default();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

const TASK_LOG: &str = "task_log";
const CHAT_LOG: &str = "chat_log";
const AGENT_STATE: &str = "agent_state";
const AUTH_TOKENS: &str = "auth_tokens";
const PREFERENCES: &str = "preferences";

const CURRENT_KEY: &str = "current";
const USER_KEY: &str = "user";

/// SQLite 存储；连接由 Mutex 串行化
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// 打开（或创建）数据库文件；父目录不存在时自动创建
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                let _ = std::fs::create_dir_all(parent);
            }
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS records(
                bucket TEXT NOT NULL,
                key TEXT NOT NULL,
                payload TEXT NOT NULL,
                seq INTEGER NOT NULL,
                PRIMARY KEY(bucket, key)
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// 写入；覆盖时保留原有顺序号
    fn put<T: Serialize>(&self, bucket: &str, key: &str, value: &T) -> Result<(), StoreError> {
        let payload = serde_json::to_string(value)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO records(bucket, key, payload, seq)
             VALUES (?1, ?2, ?3, (SELECT COALESCE(MAX(seq), 0) + 1 FROM records WHERE bucket = ?1))
             ON CONFLICT(bucket, key) DO UPDATE SET payload = excluded.payload",
            params![bucket, key, payload],
        )?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, bucket: &str, key: &str) -> Result<Option<T>, StoreError> {
        let conn = self.conn()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM records WHERE bucket = ?1 AND key = ?2",
                params![bucket, key],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(StoreError::from))
            .transpose()
    }

    fn all<T: DeserializeOwned>(&self, bucket: &str) -> Result<Vec<T>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT payload FROM records WHERE bucket = ?1 ORDER BY seq")?;
        let payloads = stmt
            .query_map(params![bucket], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        payloads
            .iter()
            .map(|p| serde_json::from_str(p).map_err(StoreError::from))
            .collect()
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let n = conn.execute(
            "DELETE FROM records WHERE bucket = ?1 AND key = ?2",
            params![bucket, key],
        )?;
        Ok(n > 0)
    }
}

impl MemoryStore for SqliteStore {
    fn add_execution_history(&self, record: ExecutionHistory) -> Result<(), StoreError> {
        self.put(TASK_LOG, &record.id, &record)
    }

    fn execution_history(&self, plan_id: Option<&str>) -> Result<Vec<ExecutionHistory>, StoreError> {
        let mut records: Vec<ExecutionHistory> = self.all(TASK_LOG)?;
        if let Some(plan_id) = plan_id {
            records.retain(|h| h.plan_id == plan_id);
        }
        Ok(records)
    }

    fn execution_history_by_step(&self, step_id: &str) -> Result<Vec<ExecutionHistory>, StoreError> {
        let mut records: Vec<ExecutionHistory> = self.all(TASK_LOG)?;
        records.retain(|h| h.step_id == step_id);
        Ok(records)
    }

    fn put_conversation(&self, conversation: Conversation) -> Result<(), StoreError> {
        self.put(CHAT_LOG, &conversation.id, &conversation)
    }

    fn conversation(&self, id: &str) -> Result<Option<Conversation>, StoreError> {
        self.get(CHAT_LOG, id)
    }

    fn conversations(&self) -> Result<Vec<Conversation>, StoreError> {
        self.all(CHAT_LOG)
    }

    fn save_agent_state(&self, state: AgentState) -> Result<(), StoreError> {
        self.put(AGENT_STATE, CURRENT_KEY, &state)
    }

    fn agent_state(&self) -> Result<Option<AgentState>, StoreError> {
        self.get(AGENT_STATE, CURRENT_KEY)
    }

    fn save_auth_token(&self, token: AuthToken) -> Result<(), StoreError> {
        self.put(AUTH_TOKENS, &token.provider_id, &token)
    }

    fn auth_token(&self, provider_id: &str) -> Result<Option<AuthToken>, StoreError> {
        self.get(AUTH_TOKENS, provider_id)
    }

    fn auth_tokens(&self) -> Result<Vec<AuthToken>, StoreError> {
        self.all(AUTH_TOKENS)
    }

    fn remove_auth_token(&self, provider_id: &str) -> Result<bool, StoreError> {
        self.delete(AUTH_TOKENS, provider_id)
    }

    fn save_preferences(&self, preferences: UserPreferences) -> Result<(), StoreError> {
        self.put(PREFERENCES, USER_KEY, &preferences)
    }

    fn preferences(&self) -> Result<Option<UserPreferences>, StoreError> {
        self.get(PREFERENCES, USER_KEY)
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.conn()?.execute("DELETE FROM records", [])?;
        Ok(())
    }
}
