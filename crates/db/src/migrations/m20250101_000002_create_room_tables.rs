//! Create room and `room_member` tables.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Room::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Room::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Room::Code)
                            .string_len(16)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Room::Name).string_len(128).not_null())
                    .col(ColumnDef::new(Room::Description).text())
                    .col(ColumnDef::new(Room::CreatorId).string_len(32).not_null())
                    .col(
                        ColumnDef::new(Room::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Room::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Room::UpdatedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_room_creator")
                            .from(Room::Table, Room::CreatorId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_room_creator_id")
                    .table(Room::Table)
                    .col(Room::CreatorId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_room_is_active")
                    .table(Room::Table)
                    .col(Room::IsActive)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RoomMember::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RoomMember::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RoomMember::RoomId).string_len(32).not_null())
                    .col(ColumnDef::new(RoomMember::UserId).string_len(32).not_null())
                    .col(
                        ColumnDef::new(RoomMember::JoinedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_room_member_room")
                            .from(RoomMember::Table, RoomMember::RoomId)
                            .to(Room::Table, Room::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_room_member_user")
                            .from(RoomMember::Table, RoomMember::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_room_member_unique")
                    .table(RoomMember::Table)
                    .col(RoomMember::RoomId)
                    .col(RoomMember::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_room_member_user_id")
                    .table(RoomMember::Table)
                    .col(RoomMember::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RoomMember::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Room::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Room {
    Table,
    Id,
    Code,
    Name,
    Description,
    CreatorId,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum RoomMember {
    Table,
    Id,
    RoomId,
    UserId,
    JoinedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
