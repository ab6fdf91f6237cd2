use crate::value_objects::{PasswordHash, Timestamp, UserEmail, UserId, Username};

/// 用户实体。归属于认证子系统，本子系统只读取身份信息。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: Username,
    pub email: UserEmail,
    #[serde(skip_serializing)] // 密码字段不暴露给客户端
    pub password: PasswordHash,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// 会话参与者的公开档案。
///
/// 由仓储层投影生成：查询语句根本不选取凭证列，
/// 保证任何响应或广播载荷都不可能携带密码哈希。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Participant {
    pub id: UserId,
    pub username: Username,
}

impl From<&User> for Participant {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
        }
    }
}
