use once_cell::sync::Lazy;
use std::fmt;
use std::ops;
use std::string::ToString;

/// Describes the ability of a user to perform a certain action.
///
/// Permissions can be mixed together like integers with `|` and `&`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Permission(u32);

impl Permission {
    /// No permissions are set (server could have been configured without ACL support).
    pub const NONE: Permission = Permission(0b00000);

    /// You can access the data of a node and can list its children.
    pub const READ: Permission = Permission(0b00001);

    /// You can set the data of a node.
    pub const WRITE: Permission = Permission(0b00010);

    /// You can create a child node.
    pub const CREATE: Permission = Permission(0b00100);

    /// You can delete a child node (but not necessarily this one).
    pub const DELETE: Permission = Permission(0b01000);

    /// You can alter permissions on this node.
    pub const ADMIN: Permission = Permission(0b10000);

    /// You can do anything.
    pub const ALL: Permission = Permission(0b11111);

    /// The raw permission bits as sent on the wire.
    pub fn code(self) -> u32 {
        self.0
    }

    /// Reconstructs a permission set from its wire bits.
    pub fn from_raw(bits: u32) -> Permission {
        Permission(bits)
    }

    /// Check that all `permissions` are set.
    pub fn can(self, permissions: Permission) -> bool {
        (self & permissions) == permissions
    }
}

impl ops::BitAnd for Permission {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Permission(self.0 & rhs.0)
    }
}

impl ops::BitOr for Permission {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Permission(self.0 | rhs.0)
    }
}

impl fmt::Debug for Permission {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if *self == Permission::ALL {
            return write!(f, "ALL");
        }
        if *self == Permission::NONE {
            return write!(f, "NONE");
        }

        let mut first = true;
        for (perm, name) in &[
            (Permission::READ, "READ"),
            (Permission::WRITE, "WRITE"),
            (Permission::CREATE, "CREATE"),
            (Permission::DELETE, "DELETE"),
            (Permission::ADMIN, "ADMIN"),
        ] {
            if self.can(*perm) {
                if !first {
                    write!(f, "|")?;
                }
                first = false;
                write!(f, "{}", name)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// An access control list entry.
///
/// The core never interprets these; they are handed to the service unchanged when a node is
/// created.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Acl {
    /// The permissions associated with this ACL.
    pub perms: Permission,
    /// The authentication scheme this list is used for. The most common scheme is `"auth"`,
    /// which allows any authenticated user to do anything (see `creator_all`).
    pub scheme: String,
    /// The ID of the user under the `scheme`. For example, the `"world"` scheme has a single ID,
    /// `"anyone"`.
    pub id: String,
}

impl Acl {
    /// Create a new ACL with the given `permissions`, `scheme`, and `id`.
    pub fn new<T, U>(permissions: Permission, scheme: T, id: U) -> Acl
    where
        T: ToString,
        U: ToString,
    {
        Acl {
            perms: permissions,
            scheme: scheme.to_string(),
            id: id.to_string(),
        }
    }

    /// This ACL gives the creators authentication id's all permissions.
    pub fn creator_all() -> &'static [Acl] {
        &ACL_CREATOR_ALL[..]
    }

    /// This is a completely open ACL.
    pub fn open_unsafe() -> &'static [Acl] {
        &ACL_OPEN_UNSAFE[..]
    }

    /// This ACL gives the world the ability to read.
    pub fn read_unsafe() -> &'static [Acl] {
        &ACL_READ_UNSAFE[..]
    }
}

static ACL_CREATOR_ALL: Lazy<[Acl; 1]> = Lazy::new(|| [Acl::new(Permission::ALL, "auth", "")]);
static ACL_OPEN_UNSAFE: Lazy<[Acl; 1]> =
    Lazy::new(|| [Acl::new(Permission::ALL, "world", "anyone")]);
static ACL_READ_UNSAFE: Lazy<[Acl; 1]> =
    Lazy::new(|| [Acl::new(Permission::READ, "world", "anyone")]);
