mod notice_flow_unit;
