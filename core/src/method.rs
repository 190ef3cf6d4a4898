//! Catalog of remote methods.
//!
//! # Design
//! Each `Method` maps to an immutable `MethodDescriptor` held in a table that
//! is built once, on first use, and never mutated. Whether a method needs a
//! session is derived while building the table: every method except the two
//! authentication bootstrap calls does.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Parameters the dispatcher appends to every session-bound call:
/// `method`, `api_key`, `v`, `call_id` and `session_key`.
pub const AUTO_APPENDED_PARAMS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub wire_name: &'static str,
    pub max_optional_params: usize,
    pub requires_session: bool,
    pub takes_file: bool,
}

impl MethodDescriptor {
    /// Upper bound on the number of parameters a request for this method
    /// carries before signing.
    pub fn total_param_count(&self) -> usize {
        if self.requires_session {
            self.max_optional_params + AUTO_APPENDED_PARAMS
        } else {
            self.max_optional_params
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    AuthCreateToken,
    AuthGetSession,
    FqlQuery,
    EventsGet,
    EventsGetMembers,
    FriendsGet,
    FriendsGetAppUsers,
    FriendsGetRequests,
    FriendsAreFriends,
    UsersGetInfo,
    UsersGetLoggedInUser,
    UsersIsAppAdded,
    PhotosGet,
    PhotosGetAlbums,
    PhotosGetTags,
    PhotosCreateAlbum,
    PhotosAddTag,
    PhotosUpload,
    NotificationsGet,
    NotificationsSend,
    NotificationsSendRequest,
    GroupsGet,
    GroupsGetMembers,
    ProfileSetFbml,
    ProfileGetFbml,
    FbmlRefreshRefUrl,
    FbmlRefreshImgSrc,
    FeedPublishActionOfUser,
    FeedPublishStoryToUser,
}

/// Methods callable before a session exists.
const BOOTSTRAP: [Method; 2] = [Method::AuthCreateToken, Method::AuthGetSession];

// (method, wire name, max optional params, takes file)
const TABLE: [(Method, &str, usize, bool); 29] = [
    (Method::AuthCreateToken, "facebook.auth.createToken", 0, false),
    (Method::AuthGetSession, "facebook.auth.getSession", 1, false),
    (Method::FqlQuery, "facebook.fql.query", 1, false),
    (Method::EventsGet, "facebook.events.get", 5, false),
    (Method::EventsGetMembers, "facebook.events.getMembers", 1, false),
    (Method::FriendsGet, "facebook.friends.get", 0, false),
    (Method::FriendsGetAppUsers, "facebook.friends.getAppUsers", 0, false),
    (Method::FriendsGetRequests, "facebook.friends.getRequests", 0, false),
    (Method::FriendsAreFriends, "facebook.friends.areFriends", 2, false),
    (Method::UsersGetInfo, "facebook.users.getInfo", 2, false),
    (Method::UsersGetLoggedInUser, "facebook.users.getLoggedInUser", 0, false),
    (Method::UsersIsAppAdded, "facebook.users.isAppAdded", 0, false),
    (Method::PhotosGet, "facebook.photos.get", 2, false),
    (Method::PhotosGetAlbums, "facebook.photos.getAlbums", 1, false),
    (Method::PhotosGetTags, "facebook.photos.getTags", 1, false),
    (Method::PhotosCreateAlbum, "facebook.photos.createAlbum", 3, false),
    (Method::PhotosAddTag, "facebook.photos.addTag", 5, false),
    (Method::PhotosUpload, "facebook.photos.upload", 3, true),
    (Method::NotificationsGet, "facebook.notifications.get", 0, false),
    (Method::NotificationsSend, "facebook.notifications.send", 5, false),
    (Method::NotificationsSendRequest, "facebook.notifications.sendRequest", 5, false),
    (Method::GroupsGet, "facebook.groups.get", 1, false),
    (Method::GroupsGetMembers, "facebook.groups.getMembers", 1, false),
    (Method::ProfileSetFbml, "facebook.profile.setFBML", 2, false),
    (Method::ProfileGetFbml, "facebook.profile.getFBML", 1, false),
    (Method::FbmlRefreshRefUrl, "facebook.fbml.refreshRefUrl", 1, false),
    (Method::FbmlRefreshImgSrc, "facebook.fbml.refreshImgSrc", 1, false),
    (Method::FeedPublishActionOfUser, "facebook.feed.publishActionOfUser", 11, false),
    (Method::FeedPublishStoryToUser, "facebook.feed.publishStoryToUser", 11, false),
];

struct Catalog {
    by_method: HashMap<Method, MethodDescriptor>,
    by_wire_name: HashMap<&'static str, Method>,
}

static CATALOG: LazyLock<Catalog> = LazyLock::new(|| {
    let mut by_method = HashMap::with_capacity(TABLE.len());
    let mut by_wire_name = HashMap::with_capacity(TABLE.len());
    for (method, wire_name, max_optional_params, takes_file) in TABLE {
        by_method.insert(
            method,
            MethodDescriptor {
                wire_name,
                max_optional_params,
                requires_session: !BOOTSTRAP.contains(&method),
                takes_file,
            },
        );
        by_wire_name.insert(wire_name, method);
    }
    Catalog {
        by_method,
        by_wire_name,
    }
});

impl Method {
    pub fn all() -> impl Iterator<Item = Method> {
        TABLE.iter().map(|(method, ..)| *method)
    }

    pub fn descriptor(self) -> &'static MethodDescriptor {
        // Every variant has a row in TABLE; `catalog_covers_every_method`
        // keeps the two in step.
        &CATALOG.by_method[&self]
    }

    pub fn wire_name(self) -> &'static str {
        self.descriptor().wire_name
    }

    pub fn requires_session(self) -> bool {
        self.descriptor().requires_session
    }

    pub fn from_wire_name(name: &str) -> Option<Method> {
        CATALOG.by_wire_name.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_covers_every_method() {
        assert_eq!(CATALOG.by_method.len(), TABLE.len());
        assert_eq!(CATALOG.by_wire_name.len(), TABLE.len());
        for method in Method::all() {
            assert_eq!(Method::from_wire_name(method.wire_name()), Some(method));
        }
    }

    #[test]
    fn only_bootstrap_methods_skip_the_session() {
        let without_session: Vec<Method> = Method::all().filter(|m| !m.requires_session()).collect();
        assert_eq!(without_session, vec![Method::AuthCreateToken, Method::AuthGetSession]);
    }

    #[test]
    fn total_param_count_adds_fixed_params_for_session_methods() {
        assert_eq!(Method::AuthCreateToken.descriptor().total_param_count(), 0);
        assert_eq!(Method::AuthGetSession.descriptor().total_param_count(), 1);
        assert_eq!(Method::FriendsGet.descriptor().total_param_count(), 5);
        assert_eq!(Method::FeedPublishStoryToUser.descriptor().total_param_count(), 16);
    }

    #[test]
    fn only_photo_upload_takes_a_file() {
        let uploads: Vec<Method> = Method::all().filter(|m| m.descriptor().takes_file).collect();
        assert_eq!(uploads, vec![Method::PhotosUpload]);
        assert_eq!(Method::PhotosUpload.descriptor().max_optional_params, 3);
    }

    #[test]
    fn unknown_wire_name() {
        assert_eq!(Method::from_wire_name("facebook.nope"), None);
    }
}
