// Code generated by protoc-gen-ormable. DO NOT EDIT.
// source: test/playlist.proto

#[allow(unused_imports)]
use protoc_gen_ormable::runtime as rt;
/// Storage record of `test.Playlist`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaylistOrm {
    pub id: u32,
    /// Account the row belongs to
    pub account_id: String,
    pub tracks: Vec<TrackOrm>,
}
impl rt::Record for PlaylistOrm {
    const TABLE: &'static str = "playlists";
    fn columns() -> &'static [rt::Column] {
        const COLUMNS: &[rt::Column] = &[
            rt::Column {
                name: "id",
                field: "id",
                primary_key: true,
                not_null: false,
                unique: false,
                auto_increment: false,
                column_type: None,
                size: None,
                default: None,
            },
            rt::Column {
                name: "account_id",
                field: "account_id",
                primary_key: false,
                not_null: false,
                unique: false,
                auto_increment: false,
                column_type: None,
                size: None,
                default: None,
            },
        ];
        COLUMNS
    }
    fn associations() -> &'static [rt::AssociationMeta] {
        const ASSOCIATIONS: &[rt::AssociationMeta] = &[
            rt::AssociationMeta {
                kind: rt::AssociationKind::HasMany,
                field: "tracks",
                target_table: "tracks",
                foreign_key: "playlist_id",
                association_key: "id",
                position_field: Some("position"),
                join: None,
                preload: false,
                replace: false,
                append: false,
                clear: false,
            },
        ];
        ASSOCIATIONS
    }
}
impl PlaylistOrm {
    /// Convert a message into its storage record
    #[allow(clippy::needless_update)]
    pub fn from_pb(pb: &Playlist) -> Result<Self, rt::Error> {
        Ok(Self {
            id: pb.id,
            tracks: pb.tracks.iter().map(TrackOrm::from_pb).collect::<Result<Vec<_>, _>>()?,
            ..Default::default()
        })
    }
    /// Convert the storage record back into its message
    #[allow(clippy::needless_update)]
    pub fn to_pb(&self) -> Result<Playlist, rt::Error> {
        Ok(Playlist {
            id: self.id,
            tracks: self.tracks.iter().map(TrackOrm::to_pb).collect::<Result<Vec<_>, _>>()?,
            ..Default::default()
        })
    }
    /// Stamp the account on this record and its account-scoped children
    pub fn scope_account(&mut self, account_id: &str) {
        self.account_id = account_id.to_string();
        for child in &mut self.tracks {
            child.scope_account(account_id);
        }
    }
}
/// Insert a new `test.Playlist`
#[allow(unused_mut, clippy::needless_update)]
pub fn default_create_playlist<S: rt::Session>(
    ctx: &rt::Context,
    session: &mut S,
    hooks: &rt::Hooks<PlaylistOrm>,
    input: &Playlist,
) -> Result<Playlist, rt::Error> {
    let account_id = ctx.account_id()?.to_string();
    let mut orm = PlaylistOrm::from_pb(input)?;
    orm.scope_account(&account_id);
    hooks.run(rt::HookPoint::BeforeCreate, ctx, &mut orm)?;
    rt::renumber_positions(&mut orm.tracks, |item, position| item.position = position);
    session.create(&mut orm)?;
    hooks.run(rt::HookPoint::AfterCreate, ctx, &mut orm)?;
    orm.to_pb()
}
/// Load one stored `test.Playlist`
#[allow(unused_mut, clippy::needless_update)]
pub fn default_read_playlist<S: rt::Session>(
    ctx: &rt::Context,
    session: &mut S,
    hooks: &rt::Hooks<PlaylistOrm>,
    input: &Playlist,
    preload: bool,
) -> Result<Playlist, rt::Error> {
    let account_id = ctx.account_id()?.to_string();
    let mut filter = PlaylistOrm::from_pb(input)?;
    filter.scope_account(&account_id);
    if rt::ZeroValue::is_zero(&filter.id) {
        return Err(rt::Error::EmptyId);
    }
    hooks.run(rt::HookPoint::BeforeRead, ctx, &mut filter)?;
    let mut query = rt::Query::new(filter).preload(preload);
    query = query.order_association("tracks", rt::Order::asc("position"));
    let mut orm = session.first(&query)?;
    hooks.run(rt::HookPoint::AfterRead, ctx, &mut orm)?;
    orm.to_pb()
}
/// Save a `test.Playlist`
#[allow(unused_mut, clippy::needless_update)]
pub fn default_update_playlist<S: rt::Session>(
    ctx: &rt::Context,
    session: &mut S,
    hooks: &rt::Hooks<PlaylistOrm>,
    input: &Playlist,
) -> Result<Playlist, rt::Error> {
    let account_id = ctx.account_id()?.to_string();
    let mut orm = PlaylistOrm::from_pb(input)?;
    orm.scope_account(&account_id);
    if rt::ZeroValue::is_zero(&orm.id) {
        return Err(rt::Error::EmptyId);
    }
    session
        .first(
            &rt::Query::new(PlaylistOrm {
                id: orm.id,
                account_id: orm.account_id.clone(),
                ..Default::default()
            }),
        )?;
    hooks.run(rt::HookPoint::BeforeUpdate, ctx, &mut orm)?;
    rt::renumber_positions(&mut orm.tracks, |item, position| item.position = position);
    session.save(&mut orm)?;
    hooks.run(rt::HookPoint::AfterUpdate, ctx, &mut orm)?;
    orm.to_pb()
}
/// Save a `test.Playlist`, replacing its has-one and has-many children
#[allow(unused_mut, clippy::needless_update)]
pub fn default_strict_update_playlist<S: rt::Session>(
    ctx: &rt::Context,
    session: &mut S,
    hooks: &rt::Hooks<PlaylistOrm>,
    input: &Playlist,
) -> Result<Playlist, rt::Error> {
    let account_id = ctx.account_id()?.to_string();
    let mut orm = PlaylistOrm::from_pb(input)?;
    orm.scope_account(&account_id);
    if rt::ZeroValue::is_zero(&orm.id) {
        return Err(rt::Error::EmptyId);
    }
    session
        .first(
            &rt::Query::new(PlaylistOrm {
                id: orm.id,
                account_id: orm.account_id.clone(),
                ..Default::default()
            }),
        )?;
    hooks.run(rt::HookPoint::BeforeUpdate, ctx, &mut orm)?;
    session
        .delete(
            &TrackOrm {
                playlist_id: Some(orm.id),
                account_id: orm.account_id.clone(),
                ..Default::default()
            },
        )?;
    rt::renumber_positions(&mut orm.tracks, |item, position| item.position = position);
    session.save(&mut orm)?;
    hooks.run(rt::HookPoint::AfterUpdate, ctx, &mut orm)?;
    orm.to_pb()
}
/// Delete one stored `test.Playlist`
#[allow(unused_mut, clippy::needless_update)]
pub fn default_delete_playlist<S: rt::Session>(
    ctx: &rt::Context,
    session: &mut S,
    hooks: &rt::Hooks<PlaylistOrm>,
    input: &Playlist,
) -> Result<(), rt::Error> {
    let account_id = ctx.account_id()?.to_string();
    let mut orm = PlaylistOrm::from_pb(input)?;
    orm.scope_account(&account_id);
    if rt::ZeroValue::is_zero(&orm.id) {
        return Err(rt::Error::EmptyId);
    }
    hooks.run(rt::HookPoint::BeforeDelete, ctx, &mut orm)?;
    session
        .delete(
            &PlaylistOrm {
                id: orm.id,
                account_id: orm.account_id.clone(),
                ..Default::default()
            },
        )?;
    hooks.run(rt::HookPoint::AfterDelete, ctx, &mut orm)?;
    Ok(())
}
/// Delete a batch of stored `test.Playlist`
#[allow(unused_mut, clippy::needless_update)]
pub fn default_delete_set_playlist<S: rt::Session>(
    ctx: &rt::Context,
    session: &mut S,
    hooks: &rt::Hooks<PlaylistOrm>,
    inputs: &[Playlist],
) -> Result<(), rt::Error> {
    if inputs.is_empty() {
        return Err(rt::Error::NilArgument);
    }
    for input in inputs {
        default_delete_playlist(ctx, session, hooks, input)?;
    }
    Ok(())
}
/// List stored `test.Playlist`
#[allow(unused_mut, clippy::needless_update)]
pub fn default_list_playlist<S: rt::Session>(
    ctx: &rt::Context,
    session: &mut S,
    hooks: &rt::Hooks<PlaylistOrm>,
    options: &rt::ListOptions,
) -> Result<Vec<Playlist>, rt::Error> {
    let account_id = ctx.account_id()?.to_string();
    let mut filter = PlaylistOrm::default();
    filter.account_id = account_id;
    hooks.run(rt::HookPoint::BeforeList, ctx, &mut filter)?;
    let mut query = rt::Query::new(filter).with_options(options.clone());
    if !options.has_order() {
        query = query.order_by(rt::Order::asc("id"));
    }
    query = query.order_association("tracks", rt::Order::asc("position"));
    let rows = session.find(&query)?;
    let mut results = Vec::with_capacity(rows.len());
    for mut row in rows {
        hooks.run(rt::HookPoint::AfterList, ctx, &mut row)?;
        results.push(row.to_pb()?);
    }
    Ok(results)
}
/// Apply a field mask to a stored `test.Playlist`
#[allow(unused_mut, clippy::needless_update)]
pub fn default_patch_playlist<S: rt::Session>(
    ctx: &rt::Context,
    session: &mut S,
    hooks: &rt::Hooks<PlaylistOrm>,
    input: &Playlist,
    mask: &rt::FieldMask,
) -> Result<Playlist, rt::Error> {
    let account_id = ctx.account_id()?.to_string();
    let mut patch = PlaylistOrm::from_pb(input)?;
    patch.scope_account(&account_id);
    if rt::ZeroValue::is_zero(&patch.id) {
        return Err(rt::Error::EmptyId);
    }
    hooks.run(rt::HookPoint::BeforePatch, ctx, &mut patch)?;
    let query = rt::Query::new(PlaylistOrm {
            id: patch.id,
            account_id: patch.account_id.clone(),
            ..Default::default()
        })
        .preload(true);
    let current = session.first(&query)?;
    let mut merged = current.to_pb()?;
    default_apply_field_mask_playlist(&mut merged, &patch.to_pb()?, mask)?;
    let mut orm = PlaylistOrm::from_pb(&merged)?;
    orm.scope_account(&account_id);
    if mask.contains("tracks") {
        session
            .delete(
                &TrackOrm {
                    playlist_id: Some(orm.id),
                    account_id: orm.account_id.clone(),
                    ..Default::default()
                },
            )?;
    }
    rt::renumber_positions(&mut orm.tracks, |item, position| item.position = position);
    session.save(&mut orm)?;
    hooks.run(rt::HookPoint::AfterPatch, ctx, &mut orm)?;
    orm.to_pb()
}
/// Apply field masks to a batch of stored `test.Playlist`
#[allow(unused_mut, clippy::needless_update)]
pub fn default_patch_set_playlist<S: rt::Session>(
    ctx: &rt::Context,
    session: &mut S,
    hooks: &rt::Hooks<PlaylistOrm>,
    inputs: &[Playlist],
    masks: &[rt::FieldMask],
) -> Result<Vec<Playlist>, rt::Error> {
    if inputs.len() != masks.len() {
        return Err(
            rt::Error::ArgumentMismatch(
                format!("{} objects and {} field masks", inputs.len(), masks.len()),
            ),
        );
    }
    let mut results = Vec::with_capacity(inputs.len());
    for (input, mask) in inputs.iter().zip(masks) {
        results.push(default_patch_playlist(ctx, session, hooks, input, mask)?);
    }
    Ok(results)
}
/// Copy masked fields between two `test.Playlist`
#[allow(unused_variables)]
pub fn default_apply_field_mask_playlist(
    patchee: &mut Playlist,
    patcher: &Playlist,
    mask: &rt::FieldMask,
) -> Result<(), rt::Error> {
    if mask.contains("id") {
        patchee.id = patcher.id;
    }
    if mask.contains("tracks") {
        patchee.tracks = patcher.tracks.clone();
    }
    Ok(())
}
/// Storage record of `test.Track`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackOrm {
    pub id: u32,
    pub title: String,
    /// Account the row belongs to
    pub account_id: String,
    /// Key maintained by associations of `test.Playlist`
    pub playlist_id: Option<u32>,
    /// Key maintained by associations of `test.Playlist`
    pub position: i64,
}
impl rt::Record for TrackOrm {
    const TABLE: &'static str = "tracks";
    fn columns() -> &'static [rt::Column] {
        const COLUMNS: &[rt::Column] = &[
            rt::Column {
                name: "id",
                field: "id",
                primary_key: true,
                not_null: false,
                unique: false,
                auto_increment: false,
                column_type: None,
                size: None,
                default: None,
            },
            rt::Column {
                name: "title",
                field: "title",
                primary_key: false,
                not_null: false,
                unique: false,
                auto_increment: false,
                column_type: None,
                size: None,
                default: None,
            },
            rt::Column {
                name: "account_id",
                field: "account_id",
                primary_key: false,
                not_null: false,
                unique: false,
                auto_increment: false,
                column_type: None,
                size: None,
                default: None,
            },
            rt::Column {
                name: "playlist_id",
                field: "playlist_id",
                primary_key: false,
                not_null: false,
                unique: false,
                auto_increment: false,
                column_type: None,
                size: None,
                default: None,
            },
            rt::Column {
                name: "position",
                field: "position",
                primary_key: false,
                not_null: false,
                unique: false,
                auto_increment: false,
                column_type: None,
                size: None,
                default: None,
            },
        ];
        COLUMNS
    }
    fn associations() -> &'static [rt::AssociationMeta] {
        const ASSOCIATIONS: &[rt::AssociationMeta] = &[];
        ASSOCIATIONS
    }
}
impl TrackOrm {
    /// Convert a message into its storage record
    #[allow(clippy::needless_update)]
    pub fn from_pb(pb: &Track) -> Result<Self, rt::Error> {
        Ok(Self {
            id: pb.id,
            title: pb.title.clone(),
            ..Default::default()
        })
    }
    /// Convert the storage record back into its message
    #[allow(clippy::needless_update)]
    pub fn to_pb(&self) -> Result<Track, rt::Error> {
        Ok(Track {
            id: self.id,
            title: self.title.clone(),
            ..Default::default()
        })
    }
    /// Stamp the account on this record and its account-scoped children
    pub fn scope_account(&mut self, account_id: &str) {
        self.account_id = account_id.to_string();
    }
}
/// Insert a new `test.Track`
#[allow(unused_mut, clippy::needless_update)]
pub fn default_create_track<S: rt::Session>(
    ctx: &rt::Context,
    session: &mut S,
    hooks: &rt::Hooks<TrackOrm>,
    input: &Track,
) -> Result<Track, rt::Error> {
    let account_id = ctx.account_id()?.to_string();
    let mut orm = TrackOrm::from_pb(input)?;
    orm.scope_account(&account_id);
    hooks.run(rt::HookPoint::BeforeCreate, ctx, &mut orm)?;
    session.create(&mut orm)?;
    hooks.run(rt::HookPoint::AfterCreate, ctx, &mut orm)?;
    orm.to_pb()
}
/// Load one stored `test.Track`
#[allow(unused_mut, clippy::needless_update)]
pub fn default_read_track<S: rt::Session>(
    ctx: &rt::Context,
    session: &mut S,
    hooks: &rt::Hooks<TrackOrm>,
    input: &Track,
    preload: bool,
) -> Result<Track, rt::Error> {
    let account_id = ctx.account_id()?.to_string();
    let mut filter = TrackOrm::from_pb(input)?;
    filter.scope_account(&account_id);
    if rt::ZeroValue::is_zero(&filter.id) {
        return Err(rt::Error::EmptyId);
    }
    hooks.run(rt::HookPoint::BeforeRead, ctx, &mut filter)?;
    let mut query = rt::Query::new(filter).preload(preload);
    let mut orm = session.first(&query)?;
    hooks.run(rt::HookPoint::AfterRead, ctx, &mut orm)?;
    orm.to_pb()
}
/// Save a `test.Track`
#[allow(unused_mut, clippy::needless_update)]
pub fn default_update_track<S: rt::Session>(
    ctx: &rt::Context,
    session: &mut S,
    hooks: &rt::Hooks<TrackOrm>,
    input: &Track,
) -> Result<Track, rt::Error> {
    let account_id = ctx.account_id()?.to_string();
    let mut orm = TrackOrm::from_pb(input)?;
    orm.scope_account(&account_id);
    if rt::ZeroValue::is_zero(&orm.id) {
        return Err(rt::Error::EmptyId);
    }
    session
        .first(
            &rt::Query::new(TrackOrm {
                id: orm.id,
                account_id: orm.account_id.clone(),
                ..Default::default()
            }),
        )?;
    hooks.run(rt::HookPoint::BeforeUpdate, ctx, &mut orm)?;
    session.save(&mut orm)?;
    hooks.run(rt::HookPoint::AfterUpdate, ctx, &mut orm)?;
    orm.to_pb()
}
/// Save a `test.Track`, replacing its has-one and has-many children
#[allow(unused_mut, clippy::needless_update)]
pub fn default_strict_update_track<S: rt::Session>(
    ctx: &rt::Context,
    session: &mut S,
    hooks: &rt::Hooks<TrackOrm>,
    input: &Track,
) -> Result<Track, rt::Error> {
    let account_id = ctx.account_id()?.to_string();
    let mut orm = TrackOrm::from_pb(input)?;
    orm.scope_account(&account_id);
    if rt::ZeroValue::is_zero(&orm.id) {
        return Err(rt::Error::EmptyId);
    }
    session
        .first(
            &rt::Query::new(TrackOrm {
                id: orm.id,
                account_id: orm.account_id.clone(),
                ..Default::default()
            }),
        )?;
    hooks.run(rt::HookPoint::BeforeUpdate, ctx, &mut orm)?;
    session.save(&mut orm)?;
    hooks.run(rt::HookPoint::AfterUpdate, ctx, &mut orm)?;
    orm.to_pb()
}
/// Delete one stored `test.Track`
#[allow(unused_mut, clippy::needless_update)]
pub fn default_delete_track<S: rt::Session>(
    ctx: &rt::Context,
    session: &mut S,
    hooks: &rt::Hooks<TrackOrm>,
    input: &Track,
) -> Result<(), rt::Error> {
    let account_id = ctx.account_id()?.to_string();
    let mut orm = TrackOrm::from_pb(input)?;
    orm.scope_account(&account_id);
    if rt::ZeroValue::is_zero(&orm.id) {
        return Err(rt::Error::EmptyId);
    }
    hooks.run(rt::HookPoint::BeforeDelete, ctx, &mut orm)?;
    session
        .delete(
            &TrackOrm {
                id: orm.id,
                account_id: orm.account_id.clone(),
                ..Default::default()
            },
        )?;
    hooks.run(rt::HookPoint::AfterDelete, ctx, &mut orm)?;
    Ok(())
}
/// Delete a batch of stored `test.Track`
#[allow(unused_mut, clippy::needless_update)]
pub fn default_delete_set_track<S: rt::Session>(
    ctx: &rt::Context,
    session: &mut S,
    hooks: &rt::Hooks<TrackOrm>,
    inputs: &[Track],
) -> Result<(), rt::Error> {
    if inputs.is_empty() {
        return Err(rt::Error::NilArgument);
    }
    for input in inputs {
        default_delete_track(ctx, session, hooks, input)?;
    }
    Ok(())
}
/// List stored `test.Track`
#[allow(unused_mut, clippy::needless_update)]
pub fn default_list_track<S: rt::Session>(
    ctx: &rt::Context,
    session: &mut S,
    hooks: &rt::Hooks<TrackOrm>,
    options: &rt::ListOptions,
) -> Result<Vec<Track>, rt::Error> {
    let account_id = ctx.account_id()?.to_string();
    let mut filter = TrackOrm::default();
    filter.account_id = account_id;
    hooks.run(rt::HookPoint::BeforeList, ctx, &mut filter)?;
    let mut query = rt::Query::new(filter).with_options(options.clone());
    if !options.has_order() {
        query = query.order_by(rt::Order::asc("id"));
    }
    let rows = session.find(&query)?;
    let mut results = Vec::with_capacity(rows.len());
    for mut row in rows {
        hooks.run(rt::HookPoint::AfterList, ctx, &mut row)?;
        results.push(row.to_pb()?);
    }
    Ok(results)
}
/// Apply a field mask to a stored `test.Track`
#[allow(unused_mut, clippy::needless_update)]
pub fn default_patch_track<S: rt::Session>(
    ctx: &rt::Context,
    session: &mut S,
    hooks: &rt::Hooks<TrackOrm>,
    input: &Track,
    mask: &rt::FieldMask,
) -> Result<Track, rt::Error> {
    let account_id = ctx.account_id()?.to_string();
    let mut patch = TrackOrm::from_pb(input)?;
    patch.scope_account(&account_id);
    if rt::ZeroValue::is_zero(&patch.id) {
        return Err(rt::Error::EmptyId);
    }
    hooks.run(rt::HookPoint::BeforePatch, ctx, &mut patch)?;
    let query = rt::Query::new(TrackOrm {
            id: patch.id,
            account_id: patch.account_id.clone(),
            ..Default::default()
        })
        .preload(true);
    let current = session.first(&query)?;
    let mut merged = current.to_pb()?;
    default_apply_field_mask_track(&mut merged, &patch.to_pb()?, mask)?;
    let mut orm = TrackOrm::from_pb(&merged)?;
    orm.scope_account(&account_id);
    session.save(&mut orm)?;
    hooks.run(rt::HookPoint::AfterPatch, ctx, &mut orm)?;
    orm.to_pb()
}
/// Apply field masks to a batch of stored `test.Track`
#[allow(unused_mut, clippy::needless_update)]
pub fn default_patch_set_track<S: rt::Session>(
    ctx: &rt::Context,
    session: &mut S,
    hooks: &rt::Hooks<TrackOrm>,
    inputs: &[Track],
    masks: &[rt::FieldMask],
) -> Result<Vec<Track>, rt::Error> {
    if inputs.len() != masks.len() {
        return Err(
            rt::Error::ArgumentMismatch(
                format!("{} objects and {} field masks", inputs.len(), masks.len()),
            ),
        );
    }
    let mut results = Vec::with_capacity(inputs.len());
    for (input, mask) in inputs.iter().zip(masks) {
        results.push(default_patch_track(ctx, session, hooks, input, mask)?);
    }
    Ok(results)
}
/// Copy masked fields between two `test.Track`
#[allow(unused_variables)]
pub fn default_apply_field_mask_track(
    patchee: &mut Track,
    patcher: &Track,
    mask: &rt::FieldMask,
) -> Result<(), rt::Error> {
    if mask.contains("id") {
        patchee.id = patcher.id;
    }
    if mask.contains("title") {
        patchee.title = patcher.title.clone();
    }
    Ok(())
}
