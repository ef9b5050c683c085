// Column names follow the on-disk stats table layout.

diesel::table! {
    stats (id) {
        id -> BigInt,
        #[sql_name = "type"]
        record_type -> Text,
        started -> BigInt,
        finished -> BigInt,
        #[sql_name = "scheduleId"]
        schedule_id -> Integer,
        #[sql_name = "layoutId"]
        layout_id -> Integer,
        #[sql_name = "mediaId"]
        media_id -> Nullable<Integer>,
        duration -> BigInt,
        #[sql_name = "count"]
        play_count -> Integer,
    }
}
