use serde::{Deserialize, Serialize};

/// 用户角色枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// 管理员
    #[serde(rename = "ROLE_ADMIN", alias = "ADMIN")]
    Admin,
    /// 教师
    #[serde(rename = "ROLE_TEACHER", alias = "TEACHER")]
    Teacher,
    /// 学生
    #[serde(rename = "ROLE_STUDENT", alias = "STUDENT")]
    Student,
    /// 家长
    #[serde(rename = "ROLE_PARENT", alias = "PARENT")]
    Parent,
}

impl Role {
    /// 获取后端使用的角色代码
    pub fn code(self) -> &'static str {
        match self {
            Role::Admin => "ROLE_ADMIN",
            Role::Teacher => "ROLE_TEACHER",
            Role::Student => "ROLE_STUDENT",
            Role::Parent => "ROLE_PARENT",
        }
    }

    /// 获取显示名称
    pub fn name(self) -> &'static str {
        match self {
            Role::Admin => "管理员",
            Role::Teacher => "教师",
            Role::Student => "学生",
            Role::Parent => "家长",
        }
    }

    /// 从字符串解析角色（支持 `ROLE_STUDENT` 与 `STUDENT` 两种写法）
    pub fn from_str(s: &str) -> Option<Self> {
        let s = s.trim();
        let bare = s.strip_prefix("ROLE_").unwrap_or(s);
        match bare.to_ascii_uppercase().as_str() {
            "ADMIN" => Some(Role::Admin),
            "TEACHER" => Some(Role::Teacher),
            "STUDENT" => Some(Role::Student),
            "PARENT" => Some(Role::Parent),
            _ => None,
        }
    }

    /// 只有学生可以参加考试
    pub fn can_take_exams(self) -> bool {
        self == Role::Student
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}
