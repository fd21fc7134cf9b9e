//! Schema synchronization for the metadata database.

use sqlx::AnyPool;

use crate::config::DbDialect;
use crate::error::StorageResult;

/// Creates the four metadata tables if they do not exist yet.
pub(crate) async fn synchronize(pool: &AnyPool, dialect: DbDialect) -> StorageResult<()> {
    let auto_pk = match dialect {
        DbDialect::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT",
        DbDialect::Mysql => "BIGINT PRIMARY KEY AUTO_INCREMENT",
    };
    // The committed block list can grow large; give it a wide text column.
    let wide_text = match dialect {
        DbDialect::Sqlite => "TEXT",
        DbDialect::Mysql => "MEDIUMTEXT",
    };

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS Services (
            accountName VARCHAR(64) PRIMARY KEY,
            defaultServiceVersion VARCHAR(32),
            cors TEXT,
            logging TEXT,
            minuteMetrics TEXT,
            hourMetrics TEXT,
            staticWebsite TEXT,
            deleteRetentionPolicy TEXT
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS Containers (
            containerId {auto_pk},
            accountName VARCHAR(64) NOT NULL,
            containerName VARCHAR(63) NOT NULL,
            lastModified VARCHAR(40) NOT NULL,
            etag VARCHAR(127) NOT NULL,
            metadata TEXT,
            containerAcl TEXT,
            publicAccess VARCHAR(31),
            lease TEXT,
            hasImmutabilityPolicy INTEGER NOT NULL DEFAULT 0,
            hasLegalHold INTEGER NOT NULL DEFAULT 0,
            UNIQUE (accountName, containerName)
        )",
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS Blobs (
            blobId {auto_pk},
            accountName VARCHAR(64) NOT NULL,
            containerName VARCHAR(63) NOT NULL,
            blobName VARCHAR(255) NOT NULL,
            snapshot VARCHAR(64) NOT NULL DEFAULT '',
            deleting INTEGER NOT NULL DEFAULT 0,
            blobType VARCHAR(31) NOT NULL,
            isCommitted INTEGER NOT NULL DEFAULT 0,
            creationTime VARCHAR(40),
            lastModified VARCHAR(40) NOT NULL,
            etag VARCHAR(127) NOT NULL,
            contentProperties TEXT,
            accessTier VARCHAR(31),
            accessTierInferred INTEGER NOT NULL DEFAULT 0,
            accessTierChangeTime VARCHAR(40),
            blobSequenceNumber INTEGER,
            leaseId VARCHAR(127),
            leaseStatus VARCHAR(31) NOT NULL DEFAULT 'unlocked',
            leaseState VARCHAR(31) NOT NULL DEFAULT 'available',
            leaseDurationType VARCHAR(31),
            leaseDurationSeconds INTEGER,
            leaseExpireTime VARCHAR(40),
            leaseBreakTime VARCHAR(40),
            persistency TEXT,
            committedBlocksInOrder {wide_text},
            metadata TEXT,
            UNIQUE (accountName, containerName, blobName, snapshot, deleting)
        )",
    ))
    .execute(pool)
    .await?;

    match dialect {
        DbDialect::Sqlite => {
            sqlx::query(&format!(
                "CREATE TABLE IF NOT EXISTS Blocks (
                    id {auto_pk},
                    accountName VARCHAR(64) NOT NULL,
                    containerName VARCHAR(63) NOT NULL,
                    blobName VARCHAR(255) NOT NULL,
                    blockName VARCHAR(127) NOT NULL,
                    deleting INTEGER NOT NULL DEFAULT 0,
                    size INTEGER NOT NULL,
                    persistency TEXT
                )",
            ))
            .execute(pool)
            .await?;
            sqlx::query(
                "CREATE INDEX IF NOT EXISTS blocksLookup
                 ON Blocks (accountName, containerName, blobName, blockName)",
            )
            .execute(pool)
            .await?;
        }
        DbDialect::Mysql => {
            // MySQL has no CREATE INDEX IF NOT EXISTS; declare it inline.
            sqlx::query(&format!(
                "CREATE TABLE IF NOT EXISTS Blocks (
                    id {auto_pk},
                    accountName VARCHAR(64) NOT NULL,
                    containerName VARCHAR(63) NOT NULL,
                    blobName VARCHAR(255) NOT NULL,
                    blockName VARCHAR(127) NOT NULL,
                    deleting INTEGER NOT NULL DEFAULT 0,
                    size BIGINT NOT NULL,
                    persistency TEXT,
                    INDEX blocksLookup (accountName, containerName, blobName, blockName)
                )",
            ))
            .execute(pool)
            .await?;
        }
    }

    Ok(())
}
