//! Auth record migration
//!
//! Auth rows are moved by value rather than by dump so the import can merge
//! into a target that already has users. Users are exported with every
//! column needed for password-preserving login and merged with an upsert on
//! the stable user id. Identity-provider links are exported alongside them
//! for operator review, but are not merged automatically: provider
//! registrations legitimately differ between a cloud project and a
//! self-hosted stack, and replaying them blindly would break logins.

use crate::layout::BackupLayout;

/// Schema holding the auth tables
pub const AUTH_SCHEMA: &str = "auth";

/// Columns exported for every auth user. `encrypted_password` is what keeps
/// existing logins working after the move.
pub const AUTH_USER_COLUMNS: &[&str] = &[
    "id",
    "email",
    "phone",
    "encrypted_password",
    "email_confirmed_at",
    "phone_confirmed_at",
    "last_sign_in_at",
    "raw_app_meta_data",
    "raw_user_meta_data",
    "is_admin",
    "created_at",
    "updated_at",
];

/// Columns overwritten when an exported user already exists on the target.
/// `id` is the conflict key and `created_at` stays as the target knows it;
/// everything tied to the credential or profile follows the source.
pub const AUTH_USER_UPSERT_COLUMNS: &[&str] = &[
    "email",
    "phone",
    "encrypted_password",
    "email_confirmed_at",
    "phone_confirmed_at",
    "last_sign_in_at",
    "raw_app_meta_data",
    "raw_user_meta_data",
    "updated_at",
];

/// Columns exported for identity-provider links
pub const AUTH_IDENTITY_COLUMNS: &[&str] = &[
    "provider_id",
    "user_id",
    "identity_data",
    "provider",
    "last_sign_in_at",
    "created_at",
    "updated_at",
];

/// SELECT used by the auth-user export step.
pub fn auth_users_query() -> String {
    format!(
        "SELECT {} FROM {}.users ORDER BY created_at",
        AUTH_USER_COLUMNS.join(", "),
        AUTH_SCHEMA
    )
}

/// SELECT used by the identity-link export step.
pub fn auth_identities_query() -> String {
    format!(
        "SELECT {} FROM {}.identities ORDER BY user_id, provider",
        AUTH_IDENTITY_COLUMNS.join(", "),
        AUTH_SCHEMA
    )
}

/// Upsert script applied by the auth-user import step.
///
/// Loads the exported CSV into a temp table and merges it into
/// `auth.users` in one transaction. Running it twice against the same
/// target updates rows in place instead of duplicating them, which is what
/// makes interrupted imports safe to repeat.
pub fn auth_users_import_sql(layout: &BackupLayout) -> String {
    let columns = AUTH_USER_COLUMNS.join(", ");
    let updates = AUTH_USER_UPSERT_COLUMNS
        .iter()
        .map(|c| format!("    {c} = EXCLUDED.{c}"))
        .collect::<Vec<_>>()
        .join(",\n");
    // The \copy meta-command must stay on a single line
    format!(
        "-- Merge exported auth users into {schema}.users.\n\
         -- Safe to run more than once: conflicts on id update in place.\n\
         BEGIN;\n\
         \n\
         CREATE TEMP TABLE auth_users_incoming (LIKE {schema}.users INCLUDING DEFAULTS) ON COMMIT DROP;\n\
         \n\
         \\copy auth_users_incoming ({columns}) FROM '{csv}' WITH (FORMAT csv, HEADER true)\n\
         \n\
         INSERT INTO {schema}.users ({columns})\n\
         SELECT {columns}\n\
         FROM auth_users_incoming\n\
         ON CONFLICT (id) DO UPDATE SET\n\
         {updates};\n\
         \n\
         COMMIT;\n",
        schema = AUTH_SCHEMA,
        columns = columns,
        csv = layout.auth_users_csv().display(),
        updates = updates,
    )
}
