//! Mock gateway identity for integration tests.
//!
//! Services behind the gateway receive `x-skyfare-user-id` + `x-skyfare-user-role`
//! headers. `MockAuth` produces the same headers so no gateway is needed.

use http::{HeaderMap, HeaderName, HeaderValue};
use uuid::Uuid;

use skyfare_auth_types::identity::{USER_ID_HEADER, USER_ROLE_HEADER};
use skyfare_domain::user::UserRole;

/// Configurable identity injected into test requests.
pub struct MockAuth {
    pub user_id: Uuid,
    pub user_role: UserRole,
}

impl MockAuth {
    pub fn new(user_id: Uuid, user_role: UserRole) -> Self {
        Self { user_id, user_role }
    }

    pub fn customer() -> Self {
        Self::new(Uuid::new_v4(), UserRole::User)
    }

    pub fn ops() -> Self {
        Self::new(Uuid::new_v4(), UserRole::Ops)
    }

    /// Return headers as if the gateway injected them.
    pub fn headers(&self) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(
            HeaderName::from_static(USER_ID_HEADER),
            HeaderValue::from_str(&self.user_id.to_string()).unwrap(),
        );
        map.insert(
            HeaderName::from_static(USER_ROLE_HEADER),
            HeaderValue::from_static(self.user_role.as_str()),
        );
        map
    }
}
