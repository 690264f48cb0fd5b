//! CRUD operations for [`Profile`] records (the Directory boundary).
//!
//! Row mapping is strict about identity and timestamps but lenient about
//! display attributes: unknown enum strings fall back to their defaults
//! rather than failing the row, mirroring how loosely-typed upstream
//! profile records are tolerated.

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use duet_shared::types::UserId;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Gender, PreferredGender, Profile, ProfileUpdate, RelationshipGoal};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new profile.
    pub fn create_profile(&self, profile: &Profile) -> Result<()> {
        self.conn().execute(
            "INSERT INTO profiles
                 (id, name, age, gender, preferred_gender, location, bio,
                  avatar, relationship_goal, premium, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                profile.id.to_string(),
                profile.name,
                profile.age,
                profile.gender.as_str(),
                profile.preferred_gender.as_str(),
                profile.location,
                profile.bio,
                profile.avatar,
                profile.relationship_goal.as_str(),
                profile.premium,
                profile.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single profile by user id.
    pub fn get_profile(&self, id: UserId) -> Result<Profile> {
        self.conn()
            .query_row(
                "SELECT id, name, age, gender, preferred_gender, location, bio,
                        avatar, relationship_goal, premium, created_at
                 FROM profiles
                 WHERE id = ?1",
                params![id.to_string()],
                row_to_profile,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// List all profiles except the given user, newest first.
    pub fn list_profiles(&self, excluding: UserId) -> Result<Vec<Profile>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, name, age, gender, preferred_gender, location, bio,
                    avatar, relationship_goal, premium, created_at
             FROM profiles
             WHERE id != ?1
             ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map(params![excluding.to_string()], row_to_profile)?;

        let mut profiles = Vec::new();
        for row in rows {
            profiles.push(row?);
        }
        Ok(profiles)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Apply a partial profile update. Fields left as `None` keep their
    /// stored value. Returns the updated profile.
    pub fn update_profile(&self, id: UserId, fields: &ProfileUpdate) -> Result<Profile> {
        let mut current = self.get_profile(id)?;

        if let Some(name) = &fields.name {
            current.name = name.clone();
        }
        if let Some(age) = fields.age {
            current.age = age;
        }
        if let Some(location) = &fields.location {
            current.location = location.clone();
        }
        if let Some(bio) = &fields.bio {
            current.bio = Some(bio.clone());
        }
        if let Some(avatar) = &fields.avatar {
            current.avatar = Some(avatar.clone());
        }
        if let Some(goal) = fields.relationship_goal {
            current.relationship_goal = goal;
        }

        self.conn().execute(
            "UPDATE profiles
             SET name = ?2, age = ?3, location = ?4, bio = ?5, avatar = ?6,
                 relationship_goal = ?7
             WHERE id = ?1",
            params![
                id.to_string(),
                current.name,
                current.age,
                current.location,
                current.bio,
                current.avatar,
                current.relationship_goal.as_str(),
            ],
        )?;

        Ok(current)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Profile`].
fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<Profile> {
    let id_str: String = row.get(0)?;
    let name: String = row.get(1)?;
    let age: u32 = row.get(2)?;
    let gender_str: String = row.get(3)?;
    let preferred_str: String = row.get(4)?;
    let location: String = row.get(5)?;
    let bio: Option<String> = row.get(6)?;
    let avatar: Option<String> = row.get(7)?;
    let goal_str: String = row.get(8)?;
    let premium: bool = row.get(9)?;
    let created_str: String = row.get(10)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Profile {
        id: UserId(id),
        name,
        age,
        gender: Gender::parse_or_default(&gender_str),
        preferred_gender: PreferredGender::parse_or_default(&preferred_str),
        location,
        bio,
        avatar,
        relationship_goal: RelationshipGoal::parse_or_default(&goal_str),
        premium,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Gender, PreferredGender, RelationshipGoal};

    fn sample_profile(name: &str) -> Profile {
        Profile {
            id: UserId::new(),
            name: name.into(),
            age: 28,
            gender: Gender::Other,
            preferred_gender: PreferredGender::All,
            location: "Tel Aviv".into(),
            bio: None,
            avatar: None,
            relationship_goal: RelationshipGoal::Casual,
            premium: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn create_get_update() {
        let db = Database::open_in_memory().unwrap();
        let profile = sample_profile("Dana");
        db.create_profile(&profile).unwrap();

        let fetched = db.get_profile(profile.id).unwrap();
        assert_eq!(fetched.name, "Dana");
        assert_eq!(fetched.bio, None);

        let updated = db
            .update_profile(
                profile.id,
                &ProfileUpdate {
                    bio: Some("hi there".into()),
                    age: Some(29),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.age, 29);
        assert_eq!(updated.bio.as_deref(), Some("hi there"));
        // Untouched fields survive.
        assert_eq!(updated.location, "Tel Aviv");
    }

    #[test]
    fn list_excludes_self() {
        let db = Database::open_in_memory().unwrap();
        let me = sample_profile("Me");
        let other = sample_profile("Other");
        db.create_profile(&me).unwrap();
        db.create_profile(&other).unwrap();

        let listed = db.list_profiles(me.id).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, other.id);
    }

    #[test]
    fn unknown_enum_strings_fall_back_to_defaults() {
        let db = Database::open_in_memory().unwrap();
        let profile = sample_profile("Legacy");
        db.create_profile(&profile).unwrap();

        // Simulate a legacy/loose upstream record.
        db.conn()
            .execute(
                "UPDATE profiles SET gender = 'x', preferred_gender = 'y',
                 relationship_goal = 'z' WHERE id = ?1",
                params![profile.id.to_string()],
            )
            .unwrap();

        let fetched = db.get_profile(profile.id).unwrap();
        assert_eq!(fetched.gender, Gender::Other);
        assert_eq!(fetched.preferred_gender, PreferredGender::All);
        assert_eq!(fetched.relationship_goal, RelationshipGoal::Casual);
    }
}
