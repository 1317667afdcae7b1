/// Static allow-list of chat users permitted to manage feeds and receive
/// escalations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminList {
    users: Vec<String>,
}

impl AdminList {
    pub fn new<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list: Vec<String> = Vec::new();
        for user in users {
            let user = user.into();
            if !user.is_empty() && !list.contains(&user) {
                list.push(user);
            }
        }
        Self { users: list }
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        self.users.iter().any(|id| id == user_id)
    }

    pub fn users(&self) -> &[String] {
        &self.users
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
